//! 特殊词登记表。
//!
//! 特殊词是带保留词序号的字面量（例如 `<|endoftext|>`），编码时整体映射到它的词序号，
//! 永远不会被拆分或参与合并。

use crate::{utok, Error, Result};
use ahash::AHashMap;
use regex::Regex;
use std::ops::Range;

#[derive(Clone, Debug, Default)]
pub struct SpecialTokens {
    /// 按声明顺序保存字面量和词序号
    literals: Vec<(String, utok)>,
    by_literal: AHashMap<String, utok>,
    by_id: AHashMap<utok, usize>,
    /// 所有字面量的匹配模式，没有特殊词时为空
    pattern: Option<Regex>,
}

/// 按特殊词切分后的文本片段。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment<'t> {
    Special(utok),
    Text(&'t str),
}

impl SpecialTokens {
    /// 登记一组特殊词，字面量或词序号重复时报错。
    pub fn new(specials: impl IntoIterator<Item = (String, utok)>) -> Result<Self> {
        let mut ans = Self::default();
        for (literal, id) in specials {
            if literal.is_empty() {
                return Err(Error::InvalidConfig("empty special token".into()));
            }
            if ans.by_literal.contains_key(&literal) || ans.by_id.contains_key(&id) {
                return Err(Error::DuplicateSpecialToken(literal));
            }
            ans.by_literal.insert(literal.clone(), id);
            ans.by_id.insert(id, ans.literals.len());
            ans.literals.push((literal, id));
        }
        ans.pattern = build_pattern(ans.literals.iter().map(|(s, _)| s.as_str()))?;
        Ok(ans)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.literals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    #[inline]
    pub fn id(&self, literal: &str) -> Option<utok> {
        self.by_literal.get(literal).copied()
    }

    #[inline]
    pub fn literal(&self, id: utok) -> Option<&str> {
        self.by_id.get(&id).map(|&i| self.literals[i].0.as_str())
    }

    #[inline]
    pub fn contains_id(&self, id: utok) -> bool {
        self.by_id.contains_key(&id)
    }

    /// 按声明顺序遍历特殊词。
    pub fn iter(&self) -> impl Iterator<Item = (&str, utok)> + '_ {
        self.literals.iter().map(|(s, id)| (s.as_str(), *id))
    }

    /// 查找 `text` 中最靠左的特殊词，同一起点处最长的字面量优先。
    pub fn find(&self, text: &str) -> Option<(Range<usize>, utok)> {
        let m = self.pattern.as_ref()?.find(text)?;
        Some((m.range(), self.by_literal[m.as_str()]))
    }

    /// 按特殊词切分文本，保持原有顺序，不产生空的文本片段。
    pub fn split<'t>(&self, text: &'t str) -> Vec<Segment<'t>> {
        let mut ans = Vec::new();
        let mut start = 0;
        if let Some(pattern) = &self.pattern {
            for m in pattern.find_iter(text) {
                if m.start() > start {
                    ans.push(Segment::Text(&text[start..m.start()]));
                }
                ans.push(Segment::Special(self.by_literal[m.as_str()]));
                start = m.end();
            }
        }
        if start < text.len() {
            ans.push(Segment::Text(&text[start..]));
        }
        ans
    }
}

/// 构造匹配所有字面量的模式。
///
/// `regex` 在同一起点按分支顺序取第一个成功的分支，
/// 因此按长度从长到短排列分支即可实现最长优先。
fn build_pattern<'a>(literals: impl IntoIterator<Item = &'a str>) -> Result<Option<Regex>> {
    let mut literals = literals.into_iter().collect::<Vec<_>>();
    if literals.is_empty() {
        return Ok(None);
    }
    literals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    let pattern = literals
        .into_iter()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");
    Ok(Some(Regex::new(&pattern)?))
}
