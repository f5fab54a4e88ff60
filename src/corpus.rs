//! 语料读取：逐个读入文件，按分隔符切成文档。

use crate::{Error, Result, TrainConfig, DEFAULT_DELIMITER};
use memchr::memmem;
use std::{fs, io::ErrorKind, path::PathBuf};

/// 一组语料文件。
#[derive(Clone, Debug)]
pub struct Corpus {
    pub files: Vec<PathBuf>,
    pub delimiter: String,
}

impl Corpus {
    pub fn new<P: Into<PathBuf>>(files: impl IntoIterator<Item = P>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    pub fn from_config(config: &TrainConfig) -> Self {
        Self {
            files: config.files.clone(),
            delimiter: config.delimiter.clone(),
        }
    }

    pub fn with_delimiter(self, delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            ..self
        }
    }

    /// 读入所有文件并切分成文档。
    ///
    /// 不存在的文件会被跳过，只留下一条警告。
    pub fn documents(&self) -> Result<Vec<String>> {
        if self.files.is_empty() {
            return Err(Error::NoInputDocuments);
        }
        let mut ans = Vec::new();
        for path in &self.files {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    log::warn!("corpus file {} not found, skipped", path.display());
                    continue;
                }
                Err(e) => return Err(Error::io(path, e)),
            };
            let before = ans.len();
            ans.extend(
                split_documents(&text, &self.delimiter)
                    .into_iter()
                    .map(str::to_string),
            );
            log::info!(
                "read {} documents from {}",
                ans.len() - before,
                path.display()
            );
        }
        Ok(ans)
    }
}

/// 按分隔符切分文本，丢弃只含空白的文档。分隔符为空时整段文本是一个文档。
pub fn split_documents<'t>(text: &'t str, delimiter: &str) -> Vec<&'t str> {
    let keep = |doc: &&str| !doc.trim().is_empty();
    if delimiter.is_empty() {
        return Some(text).into_iter().filter(keep).collect();
    }
    let mut ans = Vec::new();
    let mut start = 0;
    for pos in memmem::find_iter(text.as_bytes(), delimiter.as_bytes()) {
        ans.push(&text[start..pos]);
        start = pos + delimiter.len();
    }
    ans.push(&text[start..]);
    ans.retain(keep);
    ans
}
