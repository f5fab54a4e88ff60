//! 词表持久化：`vocab.json` 保存词表，`merges.txt` 每行保存一个合词。
//!
//! 文件中的词内容是字符串，字符串与字节序列之间的转换方式由 [`SymbolMode`] 决定。

use crate::{utok, ByteAlphabet, Error, Result, Vocab};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::{fmt, fs, marker::PhantomData, path::Path};

pub const VOCAB_FILE: &str = "vocab.json";
pub const MERGES_FILE: &str = "merges.txt";

const MERGES_HEADER: &str = "#version: 0.2";

/// 文件中的字符串如何表示词的字节内容。
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum SymbolMode {
    /// 每个字节对应字节字母表中的一个可见字符，任意字节序列都能保存
    #[default]
    ByteLevel,
    /// 字符串就是词内容的 utf-8 编码
    Raw,
}

impl SymbolMode {
    fn to_bytes(self, symbols: &str) -> Result<Vec<u8>> {
        match self {
            Self::ByteLevel => ByteAlphabet::standard().decode(symbols).ok_or_else(|| {
                Error::malformed(format!("{symbols:?} is not in the byte alphabet"))
            }),
            Self::Raw => Ok(symbols.as_bytes().to_vec()),
        }
    }

    fn to_symbols(self, piece: &[u8]) -> Result<String> {
        match self {
            Self::ByteLevel => Ok(ByteAlphabet::standard().encode(piece)),
            Self::Raw => String::from_utf8(piece.to_vec()).map_err(|_| {
                Error::malformed(format!("token {piece:?} is not valid utf-8"))
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabFile {
    ContentToId(Entries<utok>),
    IdToContent(Entries<Piece>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Piece {
    Text(String),
    Bytes(Vec<u8>),
}

/// 按文件顺序保留 JSON 对象的所有键值对，重复的键留给 [`Vocab::load`] 报错。
struct Entries<V>(Vec<(String, V)>);

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EntriesVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for EntriesVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(entry) = map.next_entry()? {
                    entries.push(entry);
                }
                Ok(Entries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor(PhantomData))
    }
}

/// 按词序号顺序写出的 内容 -> 词序号 表。
struct OrderedVocab(Vec<(String, utok)>);

impl Serialize for OrderedVocab {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

/// 解析 `vocab.json`，返回 词序号 -> 内容 表。
///
/// 接受 `{content: id}` 和 `{id: content}` 两种形式，后者的内容也可以是字节数组。
pub fn read_vocab(json: &str, mode: SymbolMode) -> Result<Vec<(utok, Vec<u8>)>> {
    match serde_json::from_str::<VocabFile>(json)? {
        VocabFile::ContentToId(Entries(entries)) => entries
            .into_iter()
            .map(|(content, id)| Ok((id, mode.to_bytes(&content)?)))
            .collect(),
        VocabFile::IdToContent(Entries(entries)) => entries
            .into_iter()
            .map(|(id, piece)| {
                let id = id
                    .parse::<utok>()
                    .map_err(|_| Error::malformed(format!("{id:?} is not a token id")))?;
                let bytes = match piece {
                    Piece::Text(s) => mode.to_bytes(&s)?,
                    Piece::Bytes(b) => b,
                };
                Ok((id, bytes))
            })
            .collect(),
    }
}

/// 生成 `vocab.json`。
pub fn write_vocab(vocab: &Vocab, mode: SymbolMode) -> Result<String> {
    let entries = vocab
        .iter()
        .map(|(id, piece)| Ok((mode.to_symbols(piece)?, id)))
        .collect::<Result<Vec<_>>>()?;
    Ok(serde_json::to_string_pretty(&OrderedVocab(entries))?)
}

/// 解析 `merges.txt`，返回按排名排列的合词。
///
/// 空行和 `#` 开头的行被忽略。
pub fn read_merges(text: &str, mode: SymbolMode) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut ans = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let fields = line.split_whitespace().collect::<Vec<_>>();
        if fields.is_empty() || line.starts_with('#') {
            continue;
        }
        let [l, r] = fields[..] else {
            return Err(Error::malformed(format!(
                "line {} of merges: expected 2 tokens, found {}",
                i + 1,
                fields.len()
            )));
        };
        ans.push((mode.to_bytes(l)?, mode.to_bytes(r)?));
    }
    Ok(ans)
}

/// 生成 `merges.txt`。
pub fn write_merges(vocab: &Vocab, mode: SymbolMode) -> Result<String> {
    let mut ans = String::from(MERGES_HEADER);
    ans.push('\n');
    for (left, right) in vocab.merges() {
        let left = merge_operand(vocab, left, mode)?;
        // 读取时 `#` 开头的行是注释
        if left.starts_with('#') {
            return Err(Error::malformed(format!(
                "merge ({left:?}, ..) would be read back as a comment"
            )));
        }
        ans.push_str(&left);
        ans.push(' ');
        ans.push_str(&merge_operand(vocab, right, mode)?);
        ans.push('\n');
    }
    Ok(ans)
}

/// 合词的一侧必须能写成不含空白的字符串。
fn merge_operand(vocab: &Vocab, token: utok, mode: SymbolMode) -> Result<String> {
    let piece = vocab.token_bytes(token).ok_or(Error::UnknownTokenId(token))?;
    let symbols = mode.to_symbols(piece)?;
    if symbols.is_empty() || symbols.contains(char::is_whitespace) {
        return Err(Error::malformed(format!(
            "merge operand {symbols:?} cannot be written on one line"
        )));
    }
    Ok(symbols)
}

/// 从 `vocab.json` 和 `merges.txt` 加载词表。
pub fn load_files(
    vocab_path: impl AsRef<Path>,
    merges_path: impl AsRef<Path>,
    mode: SymbolMode,
) -> Result<Vocab> {
    let (vocab_path, merges_path) = (vocab_path.as_ref(), merges_path.as_ref());
    let json = fs::read_to_string(vocab_path).map_err(|e| Error::io(vocab_path, e))?;
    let text = fs::read_to_string(merges_path).map_err(|e| Error::io(merges_path, e))?;

    let table = read_vocab(&json, mode)?;
    let merges = read_merges(&text, mode)?;
    let vocab = Vocab::load(table, merges)?;
    log::debug!(
        "loaded {} tokens and {} merges from {} and {}",
        vocab.len(),
        vocab.merges().len(),
        vocab_path.display(),
        merges_path.display()
    );
    Ok(vocab)
}

/// 从目录中的 `vocab.json` 和 `merges.txt` 加载词表。
pub fn load(dir: impl AsRef<Path>, mode: SymbolMode) -> Result<Vocab> {
    let dir = dir.as_ref();
    load_files(dir.join(VOCAB_FILE), dir.join(MERGES_FILE), mode)
}

/// 把词表保存为目录中的 `vocab.json` 和 `merges.txt`，目录不存在时创建。
pub fn save(vocab: &Vocab, dir: impl AsRef<Path>, mode: SymbolMode) -> Result<()> {
    let dir = dir.as_ref();
    let json = write_vocab(vocab, mode)?;
    let merges = write_merges(vocab, mode)?;

    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    for (name, content) in [(VOCAB_FILE, json), (MERGES_FILE, merges)] {
        let path = dir.join(name);
        fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
    }
    log::debug!(
        "saved {} tokens and {} merges to {}",
        vocab.len(),
        vocab.merges().len(),
        dir.display()
    );
    Ok(())
}
