//! 训练过程中的词：当前词序列，合并时报告相邻对计数的变化。

use crate::utok;

pub(crate) type Pair = (utok, utok);

#[derive(Clone, PartialEq, Eq, Debug)]
pub(crate) struct Word {
    tokens: Vec<utok>,
}

impl Word {
    /// 每个字节对应一个基础词，基础词序号从 `base` 开始按字节值排列。
    pub fn from_bytes(bytes: &[u8], base: utok) -> Self {
        Self {
            tokens: bytes.iter().map(|&b| base + b as utok).collect(),
        }
    }

    #[cfg(test)]
    pub fn from_tokens(tokens: impl Into<Vec<utok>>) -> Self {
        Self {
            tokens: tokens.into(),
        }
    }

    #[cfg(test)]
    pub fn tokens(&self) -> &[utok] {
        &self.tokens
    }

    /// 所有相邻对，允许重叠。
    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.tokens.windows(2).map(|w| (w[0], w[1]))
    }

    /// 从左到右替换所有不重叠的 `pair`，每增加或减少一个相邻对就调用一次 `on_merge`。
    pub fn merge_pair_cb(
        &mut self,
        pair: Pair,
        replacement: utok,
        on_merge: &mut impl FnMut(Pair, i32),
    ) {
        let (a, b) = pair;
        let n = self.tokens.len();
        if n < 2 {
            return;
        }

        let mut new_tokens = Vec::with_capacity(n);
        let mut i = 0;
        while i < n {
            let current = self.tokens[i];
            if i + 1 < n && pair == (current, self.tokens[i + 1]) {
                if let Some(&x) = new_tokens.last() {
                    on_merge((x, a), -1);
                    on_merge((x, replacement), 1);
                }
                on_merge(pair, -1);
                if i + 2 < n {
                    let y = self.tokens[i + 2];
                    on_merge((b, y), -1);
                    on_merge((replacement, y), 1);
                }
                new_tokens.push(replacement);
                i += 2;
            } else {
                new_tokens.push(current);
                i += 1;
            }
        }
        self.tokens = new_tokens;
    }
}
