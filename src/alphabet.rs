//! 字节字母表：256 个字节值与可打印符号之间的双射。
//!
//! 持久化的词表和合词列表以符号串保存，使任意字节序列都能表示为可读文本。
//! 可打印的 ASCII 和 Latin-1 字符映射到自身，其余字节（控制字符、空白等）
//! 依次映射到 U+0100 起的未使用码点，因此 `Ġ` 表示空格、`Ċ` 表示换行。

use crate::{Error, Result};
use ahash::AHashMap;
use std::sync::LazyLock;

/// 字节和符号的双向映射表。
#[derive(Clone, Debug)]
pub struct ByteAlphabet {
    symbols: [char; 256],
    bytes: AHashMap<char, u8>,
}

static STANDARD: LazyLock<ByteAlphabet> = LazyLock::new(|| {
    ByteAlphabet::from_table(standard_table()).unwrap_or_else(|e| unreachable!("{e}"))
});

impl ByteAlphabet {
    /// 进程内共享的标准字母表。
    #[inline]
    pub fn standard() -> &'static Self {
        &STANDARD
    }

    /// 从一张完整的表构造字母表，表中符号必须互不相同且可打印。
    pub fn from_table(symbols: [char; 256]) -> Result<Self> {
        let mut bytes = AHashMap::with_capacity(256);
        for (b, &c) in symbols.iter().enumerate() {
            if c.is_control() || c.is_whitespace() {
                return Err(Error::malformed(format!(
                    "alphabet symbol {c:?} for byte {b:#04x} is not printable"
                )));
            }
            if let Some(prev) = bytes.insert(c, b as u8) {
                return Err(Error::malformed(format!(
                    "alphabet symbol {c:?} assigned to both {prev:#04x} and {b:#04x}"
                )));
            }
        }
        Ok(Self { symbols, bytes })
    }

    #[inline(always)]
    pub fn byte_to_symbol(&self, b: u8) -> char {
        self.symbols[b as usize]
    }

    #[inline]
    pub fn symbol_to_byte(&self, c: char) -> Option<u8> {
        self.bytes.get(&c).copied()
    }

    /// 字节串 -> 符号串
    pub fn encode(&self, bytes: &[u8]) -> String {
        bytes.iter().map(|&b| self.byte_to_symbol(b)).collect()
    }

    /// 符号串 -> 字节串，遇到字母表之外的字符返回 `None`
    pub fn decode(&self, symbols: &str) -> Option<Vec<u8>> {
        symbols.chars().map(|c| self.symbol_to_byte(c)).collect()
    }
}

fn standard_table() -> [char; 256] {
    #[inline(always)]
    const fn keeps_self(b: u8) -> bool {
        matches!(b, b'!'..=b'~' | 0xa1..=0xac | 0xae..=0xff)
    }

    let mut table = ['\0'; 256];
    let mut next = 256u32;
    for b in 0..=255u8 {
        table[b as usize] = if keeps_self(b) {
            b as char
        } else {
            let c = char::from_u32(next).unwrap_or_else(|| unreachable!());
            next += 1;
            c
        };
    }
    table
}
