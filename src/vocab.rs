//! 这个模块提供词表存储：词序号与字节内容的双向映射，以及按排名排列的合词列表。
//!
//! 词表构造后不可变，可以在多个编码器、解码器之间只读共享。

use crate::{special::SpecialTokens, utok, Error, Result};
use ahash::AHashMap;
use patricia_tree::PatriciaMap;

/// 词表。
///
/// 每个词是一段不可变的字节序列，词序号从 0 开始连续分配。
/// 合词 `(left, right)` 的排名就是它在合词列表中的位置，排名越小越先合并。
pub struct Vocab {
    /// 保存所有词的字节内容，短词尽量复用长词中的片段
    pieces: Box<[u8]>,
    /// 按词序号保存内容在 `pieces` 中的位置
    slices: Box<[(u32, u32)]>,
    /// 内容 -> 词序号
    index: PatriciaMap<utok>,
    /// 单字节 -> 词序号
    bytes: Box<[Option<utok>; 256]>,
    /// 按排名排列的合词列表
    merges: Box<[(utok, utok)]>,
    /// (left, right) -> (rank, merged)
    ranks: AHashMap<(utok, utok), (u32, utok)>,
}

impl Vocab {
    /// 从词序号 -> 内容表和按排名排列的合词列表加载词表。
    ///
    /// 词序号必须唯一且连续，合词两侧及其拼接结果都必须在词表中。
    pub fn load(
        table: impl IntoIterator<Item = (utok, Vec<u8>)>,
        merges: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    ) -> Result<Self> {
        let mut table = table.into_iter().collect::<Vec<_>>();
        table.sort_unstable_by_key(|(id, _)| *id);
        for (i, (id, _)) in table.iter().enumerate() {
            match (*id as usize).cmp(&i) {
                std::cmp::Ordering::Equal => {}
                std::cmp::Ordering::Less => {
                    return Err(Error::malformed(format!("token id {id} assigned twice")))
                }
                std::cmp::Ordering::Greater => {
                    return Err(Error::malformed(format!("token id {i} is missing")))
                }
            }
        }
        let tokens = table.into_iter().map(|(_, piece)| piece).collect::<Vec<_>>();

        let merges = {
            let index = tokens
                .iter()
                .enumerate()
                .map(|(i, piece)| (piece.as_slice(), i as utok))
                .collect::<AHashMap<_, _>>();
            let find = |piece: &[u8]| {
                index.get(piece).copied().ok_or_else(|| {
                    Error::malformed(format!(
                        "merge operand {:?} is not in the vocabulary",
                        String::from_utf8_lossy(piece)
                    ))
                })
            };
            merges
                .into_iter()
                .map(|(left, right)| Ok((find(&left)?, find(&right)?)))
                .collect::<Result<Vec<_>>>()?
        };

        Self::from_parts(tokens, merges)
    }

    /// 与 [`Vocab::load`] 相同，但合词携带显式声明的排名，排名必须与列表顺序一致。
    pub fn load_ranked(
        table: impl IntoIterator<Item = (utok, Vec<u8>)>,
        merges: impl IntoIterator<Item = (u32, Vec<u8>, Vec<u8>)>,
    ) -> Result<Self> {
        let merges = merges
            .into_iter()
            .enumerate()
            .map(|(i, (rank, left, right))| {
                if rank as usize == i {
                    Ok((left, right))
                } else {
                    Err(Error::malformed(format!(
                        "merge at position {i} declares rank {rank}"
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        Self::load(table, merges)
    }

    /// 从按词序号排列的内容和按排名排列的合词构造词表。
    pub(crate) fn from_parts(tokens: Vec<Vec<u8>>, merges: Vec<(utok, utok)>) -> Result<Self> {
        if tokens.len() > utok::MAX as usize {
            return Err(Error::malformed("too many tokens"));
        }

        let mut index = PatriciaMap::new();
        let mut bytes = Box::new([None; 256]);
        for (i, piece) in tokens.iter().enumerate() {
            let id = i as utok;
            match piece.as_slice() {
                [] => return Err(Error::malformed(format!("token {id} is empty"))),
                &[b] => bytes[b as usize] = Some(id),
                [..] => {}
            }
            if let Some(prev) = index.insert(piece.as_slice(), id) {
                return Err(Error::malformed(format!(
                    "tokens {prev} and {id} have the same content {:?}",
                    String::from_utf8_lossy(piece)
                )));
            }
        }

        let mut ranks = AHashMap::with_capacity(merges.len());
        for (rank, &(left, right)) in merges.iter().enumerate() {
            let (l, r) = match (tokens.get(left as usize), tokens.get(right as usize)) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(Error::malformed(format!(
                        "merge {rank} references unknown tokens ({left}, {right})"
                    )))
                }
            };
            let mut merged = Vec::with_capacity(l.len() + r.len());
            merged.extend_from_slice(l);
            merged.extend_from_slice(r);
            let Some(&merged) = index.get(&merged) else {
                return Err(Error::malformed(format!(
                    "result {:?} of merge {rank} is not in the vocabulary",
                    String::from_utf8_lossy(&merged)
                )));
            };
            if ranks.insert((left, right), (rank as u32, merged)).is_some() {
                return Err(Error::malformed(format!(
                    "merge ({left}, {right}) listed twice"
                )));
            }
        }

        let (pieces, slices) = compress(&tokens);
        log::debug!(
            "built vocab with {} tokens ({} bytes) and {} merges",
            slices.len(),
            pieces.len(),
            merges.len(),
        );

        Ok(Self {
            pieces,
            slices,
            index,
            bytes,
            merges: merges.into_boxed_slice(),
            ranks,
        })
    }

    /// 登记特殊词：已在词表中的字面量沿用原词序号，否则追加到词表末尾。
    ///
    /// 特殊词不参与合并，也不会出现在任何合词中。
    pub fn with_specials<S: AsRef<str>>(
        self,
        literals: impl IntoIterator<Item = S>,
    ) -> Result<(Self, SpecialTokens)> {
        let mut tokens = self.iter().map(|(_, piece)| piece.to_vec()).collect::<Vec<_>>();
        let mut specials = Vec::new();
        for literal in literals {
            let literal = literal.as_ref();
            if literal.is_empty() {
                return Err(Error::InvalidConfig("empty special token".into()));
            }
            let id = match self.token_id(literal.as_bytes()) {
                Some(id) => id,
                None => match tokens.iter().skip(self.len()).position(|t| t == literal.as_bytes()) {
                    Some(i) => (self.len() + i) as utok,
                    None => {
                        tokens.push(literal.as_bytes().to_vec());
                        (tokens.len() - 1) as utok
                    }
                },
            };
            specials.push((literal.to_string(), id));
        }
        let specials = SpecialTokens::new(specials)?;
        if specials.iter().any(|(_, id)| self.is_merge_operand(id)) {
            return Err(Error::InvalidConfig(
                "special token participates in a merge".into(),
            ));
        }

        let vocab = if tokens.len() == self.len() {
            self
        } else {
            Self::from_parts(tokens, self.merges.into_vec())?
        };
        Ok((vocab, specials))
    }

    /// 词表中词的数量。
    #[inline]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// 内容 -> 词序号
    #[inline]
    pub fn token_id(&self, piece: &[u8]) -> Option<utok> {
        self.index.get(piece).copied()
    }

    /// 词序号 -> 内容
    #[inline]
    pub fn token_bytes(&self, token: utok) -> Option<&[u8]> {
        self.slices
            .get(token as usize)
            .map(|&(off, len)| &self.pieces[off as usize..][..len as usize])
    }

    /// 单字节对应的基础词。
    #[inline(always)]
    pub fn byte_token(&self, b: u8) -> Option<utok> {
        self.bytes[b as usize]
    }

    /// 合词排名，不存在时表示这一对不能合并。
    #[inline]
    pub fn merge_rank(&self, left: utok, right: utok) -> Option<u32> {
        self.ranks.get(&(left, right)).map(|&(rank, _)| rank)
    }

    /// 合词排名和合并结果。
    #[inline]
    pub(crate) fn merge(&self, left: utok, right: utok) -> Option<(u32, utok)> {
        self.ranks.get(&(left, right)).copied()
    }

    /// 按排名遍历合词。
    pub fn merges(&self) -> impl ExactSizeIterator<Item = (utok, utok)> + '_ {
        self.merges.iter().copied()
    }

    /// 按词序号遍历词。
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (utok, &[u8])> + '_ {
        self.slices
            .iter()
            .enumerate()
            .map(|(i, &(off, len))| (i as utok, &self.pieces[off as usize..][..len as usize]))
    }

    fn is_merge_operand(&self, token: utok) -> bool {
        self.merges.iter().any(|&(l, r)| l == token || r == token)
    }
}

/// 利用词表中的重复部分压缩词表。
fn compress(vocabs: &[Vec<u8>]) -> (Box<[u8]>, Box<[(u32, u32)]>) {
    let total_len = vocabs.iter().map(Vec::len).sum();
    let mut slices = vec![(0u32, 0u32); vocabs.len()];
    let mut text_buf = Vec::<u8>::with_capacity(total_len);
    let mut indices = (0..vocabs.len()).collect::<Vec<_>>();
    // 对词按内容长度从长到短排序，因为短的内容有可能是长内容的子串，可以避免重复存储相同内容
    indices.sort_by_key(|&i| std::cmp::Reverse(vocabs[i].len()));
    for i in indices {
        let v = &vocabs[i];
        // 查找子串，若存在则复用，否则将新的内容追加到缓存
        let off = memchr::memmem::find(&text_buf, v).unwrap_or_else(|| {
            let off = text_buf.len();
            text_buf.extend_from_slice(v);
            off
        });
        slices[i] = (off as u32, v.len() as u32);
    }
    (text_buf.into_boxed_slice(), slices.into_boxed_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pieces: &[&str]) -> Vec<(utok, Vec<u8>)> {
        pieces
            .iter()
            .enumerate()
            .map(|(i, p)| (i as utok, p.as_bytes().to_vec()))
            .collect()
    }

    fn merge(l: &str, r: &str) -> (Vec<u8>, Vec<u8>) {
        (l.as_bytes().to_vec(), r.as_bytes().to_vec())
    }

    fn no_merges() -> Vec<(Vec<u8>, Vec<u8>)> {
        Vec::new()
    }

    #[test]
    fn test_lookup_both_ways() {
        let vocab = Vocab::load(
            table(&["a", "b", "c", " ", "ab", "ac"]),
            [merge("a", "b"), merge("a", "c")],
        )
        .unwrap();
        assert_eq!(vocab.len(), 6);
        for (id, piece) in vocab.iter() {
            assert_eq!(vocab.token_id(piece), Some(id));
            assert_eq!(vocab.token_bytes(id), Some(piece));
        }
        assert_eq!(vocab.token_bytes(4), Some(&b"ab"[..]));
        assert_eq!(vocab.token_bytes(6), None);
        assert_eq!(vocab.token_id(b"bc"), None);
        assert_eq!(vocab.byte_token(b' '), Some(3));
        assert_eq!(vocab.byte_token(b'z'), None);
    }

    #[test]
    fn test_merge_rank_follows_list_order() {
        let vocab = Vocab::load(
            table(&["a", "b", "c", "ac", "ab"]),
            [merge("a", "c"), merge("a", "b")],
        )
        .unwrap();
        assert_eq!(vocab.merge_rank(0, 2), Some(0));
        assert_eq!(vocab.merge_rank(0, 1), Some(1));
        assert_eq!(vocab.merge(0, 1), Some((1, 4)));
        assert_eq!(vocab.merge_rank(1, 0), None);
        assert_eq!(vocab.merges().collect::<Vec<_>>(), [(0, 2), (0, 1)]);
    }

    #[test]
    fn test_load_unordered_table() {
        let vocab = Vocab::load(
            vec![(2, b"ab".to_vec()), (0, b"a".to_vec()), (1, b"b".to_vec())],
            [merge("a", "b")],
        )
        .unwrap();
        assert_eq!(vocab.token_id(b"ab"), Some(2));
    }

    #[test]
    fn test_duplicate_id_is_malformed() {
        let res = Vocab::load(vec![(0, b"a".to_vec()), (0, b"b".to_vec())], no_merges());
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let res = Vocab::load(vec![(0, b"a".to_vec()), (2, b"b".to_vec())], no_merges());
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_duplicate_content_is_malformed() {
        let res = Vocab::load(table(&["a", "a"]), no_merges());
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_merge_with_unknown_operand_is_malformed() {
        let res = Vocab::load(table(&["a", "b", "ab"]), [merge("a", "c")]);
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_merge_without_result_is_malformed() {
        let res = Vocab::load(table(&["a", "b"]), [merge("a", "b")]);
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_repeated_merge_is_malformed() {
        let res = Vocab::load(table(&["a", "b", "ab"]), [merge("a", "b"), merge("a", "b")]);
        assert!(matches!(res, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_ranked_merges_must_match_order() {
        let ok = Vocab::load_ranked(
            table(&["a", "b", "ab"]),
            [(0, b"a".to_vec(), b"b".to_vec())],
        );
        assert!(ok.is_ok());
        let bad = Vocab::load_ranked(
            table(&["a", "b", "ab"]),
            [(3, b"a".to_vec(), b"b".to_vec())],
        );
        assert!(matches!(bad, Err(Error::MalformedVocabulary(_))));
    }

    #[test]
    fn test_with_specials_appends_new_literals() {
        let vocab = Vocab::load(table(&["a", "b"]), no_merges()).unwrap();
        let (vocab, specials) = vocab.with_specials(["<|endoftext|>", "a"]).unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(specials.id("<|endoftext|>"), Some(2));
        assert_eq!(specials.id("a"), Some(0));
        assert_eq!(vocab.token_bytes(2), Some(&b"<|endoftext|>"[..]));
    }

    #[test]
    fn test_with_specials_rejects_duplicates() {
        let vocab = Vocab::load(table(&["a", "b"]), no_merges()).unwrap();
        let res = vocab.with_specials(["<s>", "<s>"]);
        assert!(matches!(res, Err(Error::DuplicateSpecialToken(_))));
    }

    #[test]
    fn test_compress_reuses_substrings() {
        let (pieces, slices) = compress(&[b"ab".to_vec(), b"b".to_vec(), b"abc".to_vec()]);
        assert_eq!(&*pieces, b"abc");
        assert_eq!(&*slices, &[(0, 2), (1, 1), (0, 3)]);
    }
}
