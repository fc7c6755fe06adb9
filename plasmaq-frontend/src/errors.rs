use std::path::PathBuf;

use plasmaq_engine::QuoteError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("未找到任何 DXF 图纸: {0:?}")]
    NoDrawings(Vec<PathBuf>),
    #[error("遍历目录 {path:?} 失败: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("输出 JSON 失败: {0}")]
    Json(#[from] serde_json::Error),
}
