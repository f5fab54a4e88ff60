#![deny(warnings)]

mod alphabet;
mod bpe;
mod config;
mod corpus;
mod error;
mod special;
mod tokenizer;
mod trainer;
mod vocab;

pub mod io;

use fancy_regex::Regex;
use std::sync::LazyLock;

pub use alphabet::ByteAlphabet;
pub use bpe::{Bpe, MergeState};
pub use config::TrainConfig;
pub use corpus::{split_documents, Corpus};
pub use error::{Error, Result};
pub use io::SymbolMode;
pub use special::{Segment, SpecialTokens};
pub use tokenizer::{DecodePolicy, Tokenizer};
pub use trainer::{train, Trainer};
pub use vocab::Vocab;

/// `utok` for token id.
#[allow(non_camel_case_types)]
pub type utok = u32;

/// 预切分模式：缩写、可带一个前导空格的字母串、数字串、其他符号串，以及连续空白。
///
/// 连续空白后紧跟非空白字符时，最后一个空白留给后面的词。
/// 训练和编码使用同一规则，合并不会跨越词边界。
pub const DEFAULT_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// 默认的文档分隔符。
pub const DEFAULT_DELIMITER: &str = "<|endoftext|>";

/// 字节字母表中基础词的数量。
pub const BYTE_ALPHABET_SIZE: usize = 256;

static DEFAULT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_PATTERN).unwrap_or_else(|e| unreachable!("{e}")));

pub trait Method {
    fn vocab_size(&self) -> usize;
    /// 编码一段不含特殊词的文本，结果追加到 `out`。
    fn encode(&self, text: &str, out: &mut Vec<utok>) -> Result<()>;
    fn decode(&self, token: utok) -> Option<&[u8]>;
}

/// 按预切分模式把文本切成词，模式未覆盖的间隙也作为独立的词。
pub(crate) fn pre_split<'t>(pattern: &Regex, text: &'t str) -> Result<Vec<&'t str>> {
    let mut ans = Vec::new();
    let mut start = 0;
    for m in pattern.find_iter(text) {
        let m = m?;
        if m.start() > start {
            ans.push(&text[start..m.start()]);
        }
        if m.end() > m.start() {
            ans.push(m.as_str());
        }
        start = m.end();
    }
    if start < text.len() {
        ans.push(&text[start..]);
    }
    Ok(ans)
}
