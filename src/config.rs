//! 训练配置。

use crate::{Corpus, Error, Result, Trainer, DEFAULT_DELIMITER, DEFAULT_PATTERN};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// 训练配置，缺省的字段取默认值。
///
/// ```json
/// {
///     "vocab_size": 8192,
///     "special_tokens": ["<|endoftext|>"],
///     "files": ["data/train.txt"]
/// }
/// ```
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(default)]
pub struct TrainConfig {
    pub vocab_size: usize,
    pub min_frequency: u64,
    pub special_tokens: Vec<String>,
    /// 语料文件
    pub files: Vec<PathBuf>,
    /// 文档分隔符
    pub delimiter: String,
    pub pattern: String,
    pub parallel: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            vocab_size: 5000,
            min_frequency: 2,
            special_tokens: Vec::new(),
            files: Vec::new(),
            delimiter: DEFAULT_DELIMITER.to_string(),
            pattern: DEFAULT_PATTERN.to_string(),
            parallel: false,
        }
    }
}

impl TrainConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config = Self::from_json(&json)?;
        log::debug!("loaded training config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.delimiter.is_empty() {
            return Err(Error::InvalidConfig("empty document delimiter".into()));
        }
        Trainer::from_config(self).validate()
    }

    /// 配置中的语料文件。
    pub fn corpus(&self) -> Corpus {
        Corpus::from_config(self)
    }
}
