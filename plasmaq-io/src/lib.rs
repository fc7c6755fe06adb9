use std::fs;
use std::path::Path;

use plasmaq_core::document::Document;
use thiserror::Error;

mod entities;
mod parser;
mod reader;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DocumentLoader {
    fn load(&self, path: &Path) -> Result<Document, IoError>;
}

const BINARY_DXF_SENTINEL: &[u8] = b"AutoCAD Binary DXF";

/// ASCII DXF 读取入口。单个实体的字段错误会降级为 `Entity::Malformed`，
/// 只有组码流本身损坏时才返回错误。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    pub fn load_str(&self, source: &str) -> Result<Document, IoError> {
        Ok(parser::parse_document(source)?)
    }

    /// 字节输入按 UTF-8 宽松解码（非法序列替换为 U+FFFD）。
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<Document, IoError> {
        if bytes.starts_with(BINARY_DXF_SENTINEL) {
            return Err(IoError::UnsupportedFeature("二进制 DXF 暂不支持".to_string()));
        }
        self.load_str(&String::from_utf8_lossy(bytes))
    }
}

impl DocumentLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Document, IoError> {
        let data = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_bytes(&data)
    }
}

#[derive(Debug)]
pub(crate) enum DxfError {
    /// 实体内部的字段错误，跳过该实体后可以继续。
    Invalid { message: String },
    /// 组码流或段结构损坏。
    Syntax { message: String },
}

impl DxfError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Invalid { message } | DxfError::Syntax { message } => {
                IoError::InvalidDocument(message)
            }
        }
    }
}
