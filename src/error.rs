//! 训练、加载、编码和解码共用的错误类型。

use crate::utok;
use std::{path::PathBuf, string::FromUtf8Error};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// 加载的词表或合词列表结构不一致
    #[error("malformed vocabulary: {0}")]
    MalformedVocabulary(String),

    /// 输入中的字节没有对应的基础词
    #[error("no token for byte {0:#04x}")]
    UnknownByte(u8),

    /// 词序号不在词表中
    #[error("unknown token id: {0}")]
    UnknownTokenId(utok),

    /// 特殊词的字面量或词序号重复
    #[error("duplicate special token: {0:?}")]
    DuplicateSpecialToken(String),

    /// 训练语料为空
    #[error("no input documents")]
    NoInputDocuments,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// 解码得到的字节不是合法的 utf-8
    #[error("decoded bytes are not valid utf-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),

    #[error("I/O error for {path}: {err}")]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 特殊词匹配模式
    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// 预切分模式编译或匹配失败
    #[error("pre-split pattern: {0}")]
    Pattern(#[from] fancy_regex::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    #[inline]
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedVocabulary(msg.into())
    }

    #[inline]
    pub(crate) fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            err,
        }
    }
}
