use crate::{
    special::{Segment, SpecialTokens},
    utok, Bpe, Error, Method, Result, Vocab,
};
use std::sync::Arc;

/// 分词器：先按特殊词切分文本，再把普通文本片段交给具体算法。
pub struct Tokenizer<M = Bpe> {
    method: M,
    special: SpecialTokens,
    policy: DecodePolicy,
}

/// 解码时遇到未知词序号的处理方式。
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum DecodePolicy {
    /// 报告 [`Error::UnknownTokenId`]
    #[default]
    Strict,
    /// 以给定标记替换未知词，结果不再满足往返一致
    Replace(String),
}

impl Tokenizer<Bpe> {
    /// 用词表和特殊词构造字节级 BPE 分词器。
    ///
    /// 不在词表中的特殊词追加到词表末尾。
    pub fn new<S: AsRef<str>>(vocab: Vocab, specials: impl IntoIterator<Item = S>) -> Result<Self> {
        let (vocab, special) = vocab.with_specials(specials)?;
        Ok(Self::with_method(Bpe::new(Arc::new(vocab)), special))
    }

    #[inline]
    pub fn vocab(&self) -> &Vocab {
        self.method.vocab()
    }

    /// 内容 -> 词序号
    #[inline]
    pub fn token_to_id(&self, token: &str) -> Option<utok> {
        self.vocab().token_id(token.as_bytes())
    }

    /// 词序号 -> 内容
    #[inline]
    pub fn id_to_token(&self, token: utok) -> Option<&[u8]> {
        self.vocab().token_bytes(token)
    }
}

impl<M: Method> Tokenizer<M> {
    pub fn with_method(method: M, special: SpecialTokens) -> Self {
        Self {
            method,
            special,
            policy: DecodePolicy::Strict,
        }
    }

    pub fn with_decode_policy(self, policy: DecodePolicy) -> Self {
        Self { policy, ..self }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<utok>> {
        let mut ans = Vec::new();
        for segment in self.special.split(text) {
            match segment {
                Segment::Special(t) => ans.push(t),
                Segment::Text(text) => self.method.encode(text, &mut ans)?,
            }
        }
        Ok(ans)
    }

    /// 逐段编码一组文本。
    pub fn encode_iter<'a, S: AsRef<str> + 'a>(
        &'a self,
        texts: impl IntoIterator<Item = S> + 'a,
    ) -> impl Iterator<Item = Result<Vec<utok>>> + 'a {
        texts.into_iter().map(|text| self.encode(text.as_ref()))
    }

    /// 编码一批互相独立的文本，启用 `rayon` 特性时并行执行。
    pub fn encode_batch<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Result<Vec<Vec<utok>>>
    where
        M: Sync,
    {
        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            texts.par_iter().map(|t| self.encode(t.as_ref())).collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            texts.iter().map(|t| self.encode(t.as_ref())).collect()
        }
    }

    pub fn decode_bytes(&self, tokens: &[utok]) -> Result<Vec<u8>> {
        let mut ans = Vec::new();
        for &t in tokens {
            if let Some(literal) = self.special.literal(t) {
                ans.extend_from_slice(literal.as_bytes());
                continue;
            }
            match (self.method.decode(t), &self.policy) {
                (Some(piece), _) => ans.extend_from_slice(piece),
                (None, DecodePolicy::Replace(marker)) => ans.extend_from_slice(marker.as_bytes()),
                (None, DecodePolicy::Strict) => return Err(Error::UnknownTokenId(t)),
            }
        }
        Ok(ans)
    }

    pub fn decode(&self, tokens: &[utok]) -> Result<String> {
        Ok(String::from_utf8(self.decode_bytes(tokens)?)?)
    }

    #[inline]
    pub fn vocab_size(&self) -> usize {
        self.method.vocab_size()
    }

    #[inline]
    pub fn special_tokens(&self) -> &SpecialTokens {
        &self.special
    }

    #[inline]
    pub fn internal(&self) -> &M {
        &self.method
    }
}
