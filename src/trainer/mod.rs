//! # BPE 训练
//!
//! 统计语料中相邻对的出现次数，每轮选择出现次数最多的相邻对合并为新词，
//! 直到词表达到目标大小或没有出现次数不低于 `min_frequency` 的相邻对。
//!
//! 相邻对计数只在每次合并涉及的词上增量更新，
//! 最大堆中的计数是上界，弹出时与当前计数核对后再使用。

mod pair_index;
mod word;

use crate::{
    pre_split,
    special::{Segment, SpecialTokens},
    utok, Error, Result, TrainConfig, Vocab, BYTE_ALPHABET_SIZE, DEFAULT_PATTERN,
};
use ahash::{AHashMap, AHashSet};
use dary_heap::OctonaryHeap;
use fancy_regex::Regex;
use pair_index::PairIndex;
use std::cmp::Ordering;
use word::{Pair, Word};

/// 词表训练器。
#[derive(Clone, Debug)]
pub struct Trainer {
    /// 目标词表大小，包括特殊词和 256 个基础词
    pub vocab_size: usize,
    /// 出现次数低于此值的相邻对不再合并
    pub min_frequency: u64,
    /// 特殊词，占据最前面的词序号
    pub special_tokens: Vec<String>,
    /// 预切分模式
    pub pattern: String,
    /// 是否并行统计，需要启用 `rayon` 特性
    pub parallel: bool,
}

impl Trainer {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            min_frequency: 2,
            special_tokens: Vec::new(),
            pattern: DEFAULT_PATTERN.to_string(),
            parallel: false,
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            vocab_size: config.vocab_size,
            min_frequency: config.min_frequency,
            special_tokens: config.special_tokens.clone(),
            pattern: config.pattern.clone(),
            parallel: config.parallel,
        }
    }

    pub fn with_min_frequency(self, min_frequency: u64) -> Self {
        Self {
            min_frequency,
            ..self
        }
    }

    pub fn with_special_tokens<S: Into<String>>(self, specials: impl IntoIterator<Item = S>) -> Self {
        Self {
            special_tokens: specials.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..self
        }
    }

    pub fn with_parallel(self, parallel: bool) -> Self {
        Self { parallel, ..self }
    }

    /// 检查配置，返回编译好的预切分模式和特殊词表。
    fn prepare(&self) -> Result<(Regex, SpecialTokens)> {
        let base = self.special_tokens.len() + BYTE_ALPHABET_SIZE;
        if self.vocab_size < base {
            return Err(Error::InvalidConfig(format!(
                "vocab size {} is smaller than the {base} reserved tokens",
                self.vocab_size
            )));
        }
        if self.vocab_size > utok::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "vocab size {} does not fit in a token id",
                self.vocab_size
            )));
        }
        if self.min_frequency == 0 {
            return Err(Error::InvalidConfig("min frequency must be positive".into()));
        }
        if self.parallel && cfg!(not(feature = "rayon")) {
            return Err(Error::InvalidConfig(
                "parallel training requires the `rayon` feature".into(),
            ));
        }
        let specials = SpecialTokens::new(
            self.special_tokens
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i as utok)),
        )?;
        if let Some((s, _)) = specials.iter().find(|(s, _)| s.len() == 1) {
            return Err(Error::InvalidConfig(format!(
                "special token {s:?} collides with a base byte token"
            )));
        }
        Ok((Regex::new(&self.pattern)?, specials))
    }

    /// 检查配置。
    pub fn validate(&self) -> Result<()> {
        self.prepare().map(|_| ())
    }

    /// 在一组文档上训练词表。
    ///
    /// 得到的词表中，特殊词占据 `0..N`，随后是按字节值排列的 256 个基础词，
    /// 最后是按合并顺序排列的新词。
    pub fn train<I>(&self, documents: I) -> Result<Vocab>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let (pattern, specials) = self.prepare()?;
        let mut documents = documents.into_iter().peekable();
        if documents.peek().is_none() {
            return Err(Error::NoInputDocuments);
        }

        log::info!("counting words");
        let word_counts = if self.parallel {
            count_words_parallel(documents, &pattern, &specials)?
        } else {
            let mut counts = AHashMap::new();
            for doc in documents {
                count_words(&mut counts, doc.as_ref(), &pattern, &specials)?;
            }
            counts
        };
        log::info!("counted {} unique words", word_counts.len());

        self.train_word_counts(word_counts, specials.len())
    }

    /// 在 `{word: count}` 表上训练词表。
    fn train_word_counts(&self, word_counts: AHashMap<String, u64>, n_specials: usize) -> Result<Vocab> {
        // 排序使词序号与哈希种子无关
        let mut word_counts = word_counts.into_iter().collect::<Vec<_>>();
        word_counts.sort_unstable();

        let base = n_specials as utok;
        let (mut words, counts): (Vec<Word>, Vec<u64>) = word_counts
            .iter()
            .map(|(w, c)| (Word::from_bytes(w.as_bytes(), base), *c))
            .unzip();

        // 词按词序号追加，词的内容就是其字节序列
        let mut tokens = self
            .special_tokens
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect::<Vec<_>>();
        tokens.extend((0..=255u8).map(|b| vec![b]));
        let mut ids = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as utok))
            .collect::<AHashMap<_, _>>();

        let reserved = tokens.len();
        let num_merges = self.vocab_size - reserved;
        log::info!("starting BPE training: {num_merges} merges to compute");
        let mut merges = Vec::<Pair>::with_capacity(num_merges);

        log::info!("building pair index");
        let PairIndex {
            mut pair_counts,
            pair_to_word_index,
        } = PairIndex::build(&words, &counts, self.parallel);

        log::info!("building heap with {} unique pairs", pair_counts.len());
        let mut heap = OctonaryHeap::with_capacity(pair_counts.len());
        for (pair, word_indices) in pair_to_word_index {
            let count = pair_counts.get(&pair).copied().unwrap_or(0);
            if count > 0 {
                heap.push(MergeJob::new(&tokens, pair, count, word_indices));
            }
        }

        let mut last_log_percent = 0;
        while tokens.len() < self.vocab_size {
            let Some(mut job) = heap.pop() else {
                break;
            };

            // 堆中的计数可能已过期，刷新后放回
            let current = pair_counts.get(&job.pair).copied().unwrap_or(0);
            if job.count != current {
                job.count = current;
                if current > 0 {
                    heap.push(job);
                }
                continue;
            }
            if job.count < self.min_frequency {
                break;
            }

            // 不同的相邻对可能拼出相同的内容，此时沿用已有的词
            let new_token = match ids.get(&*job.piece) {
                Some(&id) => id,
                None => {
                    let id = tokens.len() as utok;
                    ids.insert(job.piece.to_vec(), id);
                    tokens.push(job.piece.to_vec());
                    id
                }
            };
            merges.push(job.pair);

            let mut local_updates = AHashMap::<Pair, AHashSet<usize>>::with_capacity(16);
            for &i in &job.word_indices {
                let weight = counts[i];
                words[i].merge_pair_cb(job.pair, new_token, &mut |pair, delta| {
                    let count = pair_counts.entry(pair).or_default();
                    if delta < 0 {
                        *count -= weight;
                    } else {
                        *count += weight;
                        local_updates.entry(pair).or_default().insert(i);
                    }
                });
            }
            for (pair, word_indices) in local_updates {
                let count = pair_counts.get(&pair).copied().unwrap_or(0);
                if count > 0 {
                    heap.push(MergeJob::new(&tokens, pair, count, word_indices));
                }
            }

            let percent = (tokens.len() - reserved) * 100 / num_merges;
            if percent > last_log_percent {
                log::info!(
                    "progress: {percent}% ({}/{num_merges} tokens), last merge {:?} -> {new_token} (frequency: {})",
                    tokens.len() - reserved,
                    job.pair,
                    job.count,
                );
                last_log_percent = percent;
            }
        }

        log::info!(
            "finished training: {} merges, {} tokens",
            merges.len(),
            tokens.len()
        );
        Vocab::from_parts(tokens, merges)
    }
}

/// 按配置训练词表。
pub fn train<I>(documents: I, config: &TrainConfig) -> Result<Vocab>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Trainer::from_config(config).train(documents)
}

/// 切掉特殊词后预切分文档，累加词频。
fn count_words(
    counts: &mut AHashMap<String, u64>,
    doc: &str,
    pattern: &Regex,
    specials: &SpecialTokens,
) -> Result<()> {
    for segment in specials.split(doc) {
        let Segment::Text(text) = segment else {
            continue;
        };
        for word in pre_split(pattern, text)? {
            match counts.get_mut(word) {
                Some(count) => *count += 1,
                None => {
                    counts.insert(word.to_string(), 1);
                }
            }
        }
    }
    Ok(())
}

/// 文档按块读入，块内并行统计后归并。
#[cfg(feature = "rayon")]
fn count_words_parallel<I>(
    documents: I,
    pattern: &Regex,
    specials: &SpecialTokens,
) -> Result<AHashMap<String, u64>>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    use rayon::prelude::*;

    const CHUNK: usize = 4096;

    fn merge_counts(
        mut acc: AHashMap<String, u64>,
        other: AHashMap<String, u64>,
    ) -> AHashMap<String, u64> {
        for (word, count) in other {
            *acc.entry(word).or_default() += count;
        }
        acc
    }

    let mut documents = documents;
    let mut counts = AHashMap::new();
    let mut chunk = Vec::<String>::with_capacity(CHUNK);
    loop {
        chunk.clear();
        chunk.extend(
            documents
                .by_ref()
                .take(CHUNK)
                .map(|doc| doc.as_ref().to_string()),
        );
        if chunk.is_empty() {
            break;
        }
        let part = chunk
            .par_iter()
            .try_fold(AHashMap::new, |mut acc, doc| {
                count_words(&mut acc, doc, pattern, specials)?;
                Ok::<_, Error>(acc)
            })
            .try_reduce(AHashMap::new, |acc, other| Ok(merge_counts(acc, other)))?;
        counts = merge_counts(counts, part);
    }
    Ok(counts)
}

/// 未启用 `rayon` 时 [`Trainer::prepare`] 拒绝并行配置，这里只是顺序统计。
#[cfg(not(feature = "rayon"))]
fn count_words_parallel<I>(
    documents: I,
    pattern: &Regex,
    specials: &SpecialTokens,
) -> Result<AHashMap<String, u64>>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    let mut counts = AHashMap::new();
    for doc in documents {
        count_words(&mut counts, doc.as_ref(), pattern, specials)?;
    }
    Ok(counts)
}

/// 一个可能被合并的相邻对。
#[derive(Debug)]
struct MergeJob {
    /// 相邻对的加权出现次数
    count: u64,
    pair: Pair,
    /// 合并结果的内容
    piece: Box<[u8]>,
    /// 可能包含这一对的词
    word_indices: AHashSet<usize>,
}

impl MergeJob {
    fn new(tokens: &[Vec<u8>], pair: Pair, count: u64, word_indices: AHashSet<usize>) -> Self {
        let (l, r) = (&tokens[pair.0 as usize], &tokens[pair.1 as usize]);
        let mut piece = Vec::with_capacity(l.len() + r.len());
        piece.extend_from_slice(l);
        piece.extend_from_slice(r);
        Self {
            count,
            pair,
            piece: piece.into_boxed_slice(),
            word_indices,
        }
    }
}

impl PartialEq for MergeJob {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for MergeJob {}

impl PartialOrd for MergeJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeJob {
    /// 出现次数多者优先；次数相同时合并结果字典序小者优先，再按词序号对。
    fn cmp(&self, other: &Self) -> Ordering {
        self.count
            .cmp(&other.count)
            .then_with(|| other.piece.cmp(&self.piece))
            .then_with(|| other.pair.cmp(&self.pair))
    }
}
