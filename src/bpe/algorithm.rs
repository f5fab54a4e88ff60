use super::Bpe;
use crate::{utok, Error, Result};
use std::{
    cmp::Ordering::{self, Equal},
    collections::BinaryHeap,
};

/// 已被左侧词覆盖的位置。
const COVERED: utok = utok::MAX;

pub struct MergeState<'v> {
    bpe: &'v Bpe,
    marks: Vec<Mark>,
    merges: BinaryHeap<Merge>,
}

pub struct IntoIter<'v> {
    bpe: &'v Bpe,
    marks: Vec<Mark>,
    i: usize,
}

impl Bpe {
    /// 把一个词的每个字节映射到基础词，并把所有可合并的相邻对加入合并队列。
    pub fn begin_merge<'v>(&'v self, word: &[u8]) -> Result<MergeState<'v>> {
        let marks = word
            .iter()
            .enumerate()
            .map(|(i, &b)| {
                let token = self.vocab.byte_token(b).ok_or(Error::UnknownByte(b))?;
                Ok(Mark {
                    token,
                    back_distance: (i > 0) as _,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let merges = marks
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| self.build_merge(i, (pair[0].token, pair[1].token)))
            .collect();

        Ok(MergeState {
            bpe: self,
            marks,
            merges,
        })
    }

    fn build_merge(&self, pos: usize, pair: (utok, utok)) -> Option<Merge> {
        self.vocab
            .merge(pair.0, pair.1)
            .map(|(rank, merge)| Merge {
                pos,
                pair,
                merge,
                rank,
            })
    }

    /// 词在原文中占据的字节数。
    #[inline(always)]
    fn piece_len(&self, token: utok) -> usize {
        self.vocab.token_bytes(token).map_or(1, <[u8]>::len)
    }
}

#[derive(Clone, Copy, Debug)]
struct Mark {
    token: utok,
    back_distance: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
struct Merge {
    pos: usize,
    pair: (utok, utok),
    merge: utok,
    rank: u32,
}
impl Ord for Merge {
    fn cmp(&self, other: &Self) -> Ordering {
        // 比较顺序：rank -> pos -> pair，排名相同时最左侧优先
        match self.rank.cmp(&other.rank) {
            Equal => match self.pos.cmp(&other.pos) {
                Equal => self.pair.cmp(&other.pair),
                other => other,
            },
            other => other,
        }
        .reverse()
    }
}
impl PartialOrd for Merge {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl MergeState<'_> {
    /// 尝试执行一次合并，返回是否成功执行了一次合并。
    pub fn merge(&mut self) -> bool {
        // 一次合并将涉及至多 4 个 token：
        //
        // t0 t1 t2 t3
        // -- -- -- --
        //      ↓
        // t0 merge t3
        // -- ----- --
        //
        // 成功的合并将至少消费合并队列中的 1 个项，
        // 同时至多向合并队列添加 2 个项：
        //
        // t0 merge t3
        //    --------
        // --------

        while let Some(Merge {
            pos: p1,
            pair: (t1, t2),
            merge,
            ..
        }) = self.merges.pop()
        {
            // 确认合并项有效性
            if self.marks[p1].token != t1 {
                continue;
            }
            let l1 = self.bpe.piece_len(t1);
            let p2 = p1 + l1;
            match self.marks.get(p2) {
                Some(mark) if mark.token == t2 => {}
                _ => continue,
            }
            // 合并
            self.marks[p1].token = merge;
            self.marks[p2].token = COVERED;

            let l2 = self.bpe.piece_len(t2);
            let p3 = p2 + l2;
            // 创建 merge + t3 合并项
            if let Some(Mark {
                token,
                back_distance,
            }) = self.marks.get_mut(p3)
            {
                *back_distance = (l1 + l2) as _;
                let t3 = *token;
                if let Some(merge) = self.bpe.build_merge(p1, (merge, t3)) {
                    self.merges.push(merge);
                }
            }
            // 创建 t0 + merge 合并项
            match self.marks[p1].back_distance as usize {
                0 => {}
                l0 => {
                    let p0 = p1 - l0;
                    let t0 = self.marks[p0].token;
                    if let Some(merge) = self.bpe.build_merge(p0, (t0, merge)) {
                        self.merges.push(merge);
                    }
                }
            }
            return true;
        }
        false
    }
}

impl<'v> IntoIterator for MergeState<'v> {
    type Item = utok;
    type IntoIter = IntoIter<'v>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        Self::IntoIter {
            bpe: self.bpe,
            marks: self.marks,
            i: 0,
        }
    }
}

impl Iterator for IntoIter<'_> {
    type Item = utok;

    fn next(&mut self) -> Option<Self::Item> {
        match &self.marks[self.i..] {
            &[Mark { token, .. }, ..] => {
                self.i += self.bpe.piece_len(token);
                Some(token)
            }
            [] => None,
        }
    }
}
