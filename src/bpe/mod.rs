mod algorithm;

use crate::{pre_split, utok, Method, Result, Vocab, DEFAULT_REGEX};
use fancy_regex::Regex;
use std::sync::Arc;

pub use algorithm::MergeState;

/// 字节级 BPE。
///
/// 文本先按预切分模式切成词，每个词的字节映射到基础词，
/// 再按合词排名从低到高反复合并相邻对，直到没有可合并的相邻对。
pub struct Bpe {
    /// 只读共享的词表
    vocab: Arc<Vocab>,
    /// 预切分模式，为空时整段文本作为一个词
    pattern: Option<Regex>,
}

impl Bpe {
    /// 使用默认预切分模式构造。
    pub fn new(vocab: Arc<Vocab>) -> Self {
        Self {
            vocab,
            pattern: Some(DEFAULT_REGEX.clone()),
        }
    }

    /// 替换预切分模式。
    pub fn with_pattern(self, pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: Some(Regex::new(pattern)?),
            ..self
        })
    }

    /// 不做预切分，每个普通文本片段作为一个词。
    pub fn without_pre_split(self) -> Self {
        Self {
            pattern: None,
            ..self
        }
    }

    #[inline]
    pub fn vocab(&self) -> &Vocab {
        &self.vocab
    }

    #[inline]
    pub fn shared_vocab(&self) -> Arc<Vocab> {
        self.vocab.clone()
    }

    /// 编码一个词，结果追加到 `out`。
    pub fn encode_word(&self, word: &[u8], out: &mut Vec<utok>) -> Result<()> {
        let mut state = self.begin_merge(word)?;
        while state.merge() {}
        out.extend(state);
        Ok(())
    }
}

impl Method for Bpe {
    #[inline]
    fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    fn encode(&self, text: &str, out: &mut Vec<utok>) -> Result<()> {
        match &self.pattern {
            Some(pattern) => pre_split(pattern, text)?
                .into_iter()
                .try_for_each(|word| self.encode_word(word.as_bytes(), out)),
            None => self.encode_word(text.as_bytes(), out),
        }
    }

    #[inline]
    fn decode(&self, token: utok) -> Option<&[u8]> {
        self.vocab.token_bytes(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a() -> Vocab {
        Vocab::load(
            ["a", "b", "c", " ", "ab", "ac"]
                .iter()
                .enumerate()
                .map(|(i, p)| (i as utok, p.as_bytes().to_vec())),
            [
                (b"a".to_vec(), b"b".to_vec()),
                (b"a".to_vec(), b"c".to_vec()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_with_pre_split() {
        let bpe = Bpe::new(Arc::new(scenario_a()));
        let mut out = Vec::new();
        bpe.encode("ab ac", &mut out).unwrap();
        assert_eq!(out, [4, 3, 5]);
    }

    #[test]
    fn test_encode_without_pre_split() {
        let bpe = Bpe::new(Arc::new(scenario_a())).without_pre_split();
        let mut out = Vec::new();
        bpe.encode("ab ac", &mut out).unwrap();
        assert_eq!(out, [4, 3, 5]);
    }

    #[test]
    fn test_custom_pattern() {
        assert!(Bpe::new(Arc::new(scenario_a())).with_pattern("(").is_err());
        let bpe = Bpe::new(Arc::new(scenario_a())).with_pattern(".").unwrap();
        let mut out = Vec::new();
        bpe.encode("ab", &mut out).unwrap();
        assert_eq!(out, [0, 1]);
    }

    #[test]
    fn test_decode_token() {
        let bpe = Bpe::new(Arc::new(scenario_a()));
        assert_eq!(bpe.decode(5), Some(&b"ac"[..]));
        assert_eq!(bpe.decode(6), None);
        assert_eq!(bpe.vocab_size(), 6);
    }
}
