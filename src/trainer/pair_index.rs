//! 相邻对计数和相邻对 -> 词的索引。

use super::word::{Pair, Word};
use ahash::{AHashMap, AHashSet};

/// 以 `(word, count)` 表为输入建立的相邻对索引。
#[derive(Debug, Default)]
pub(crate) struct PairIndex {
    /// 相邻对 -> 加权出现次数
    ///
    /// ``sum(words[i].pairs().filter(== pair).count() * counts[i])``
    pub pair_counts: AHashMap<Pair, u64>,
    /// 相邻对 -> 包含它的词
    pub pair_to_word_index: AHashMap<Pair, AHashSet<usize>>,
}

impl PairIndex {
    /// 建立索引，`words` 中的词互不相同，`counts[i]` 是 `words[i]` 的出现次数。
    pub fn build(words: &[Word], counts: &[u64], parallel: bool) -> Self {
        if parallel {
            #[cfg(feature = "rayon")]
            return Self::build_rayon(words, counts);
        }
        Self::build_serial(words, counts)
    }

    fn observe_word(&mut self, index: usize, word: &Word, count: u64) {
        if count == 0 {
            return;
        }
        for p in word.pairs() {
            *self.pair_counts.entry(p).or_default() += count;
            self.pair_to_word_index.entry(p).or_default().insert(index);
        }
    }

    fn build_serial(words: &[Word], counts: &[u64]) -> Self {
        let mut ans = Self::default();
        for (i, (word, &count)) in words.iter().zip(counts).enumerate() {
            ans.observe_word(i, word, count);
        }
        ans
    }

    /// 各分片分别计数，再归并为全局索引。
    #[cfg(feature = "rayon")]
    fn build_rayon(words: &[Word], counts: &[u64]) -> Self {
        use rayon::prelude::*;

        words
            .par_iter()
            .zip(counts.par_iter())
            .enumerate()
            .fold(Self::default, |mut acc, (i, (word, &count))| {
                acc.observe_word(i, word, count);
                acc
            })
            .reduce(Self::default, |mut acc, other| {
                for (k, v) in other.pair_counts {
                    *acc.pair_counts.entry(k).or_default() += v;
                }
                for (k, s) in other.pair_to_word_index {
                    acc.pair_to_word_index.entry(k).or_default().extend(s);
                }
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_index_serial() {
        test_pair_index(false);
    }

    #[test]
    #[cfg(feature = "rayon")]
    fn test_pair_index_parallel() {
        test_pair_index(true);
    }

    fn test_pair_index(parallel: bool) {
        let words = [
            Word::from_bytes(b"hello", 0),
            Word::from_bytes(b"world", 0),
            Word::from_bytes(b"help", 0),
            Word::from_bytes(b"x", 0),
        ];
        let counts = [1, 2, 3, 5];
        let PairIndex {
            pair_counts,
            pair_to_word_index,
        } = PairIndex::build(&words, &counts, parallel);

        let p = |a: u8, b: u8| (a as u32, b as u32);
        let mut pair_counts = pair_counts.into_iter().collect::<Vec<_>>();
        pair_counts.sort();
        assert_eq!(
            pair_counts,
            [
                (p(b'e', b'l'), 4),
                (p(b'h', b'e'), 4),
                (p(b'l', b'd'), 2),
                (p(b'l', b'l'), 1),
                (p(b'l', b'o'), 1),
                (p(b'l', b'p'), 3),
                (p(b'o', b'r'), 2),
                (p(b'r', b'l'), 2),
                (p(b'w', b'o'), 2),
            ]
        );

        let mut words_of_el = pair_to_word_index[&p(b'e', b'l')]
            .iter()
            .copied()
            .collect::<Vec<_>>();
        words_of_el.sort();
        assert_eq!(words_of_el, [0, 2]);
        assert_eq!(pair_to_word_index.len(), 9);
    }

    #[test]
    fn test_overlapping_pairs_are_counted() {
        let words = [Word::from_bytes(b"aaab", 0)];
        let index = PairIndex::build(&words, &[2], false);
        assert_eq!(index.pair_counts[&(97, 97)], 4);
        assert_eq!(index.pair_counts[&(97, 98)], 2);
    }
}
