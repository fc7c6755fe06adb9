pub mod assemble;
pub mod boundary;
pub mod costing;
pub mod curves;
pub mod extract;
pub mod material;
pub mod result;
pub mod transform;

pub mod errors {
    use thiserror::Error;

    /// 单个实体或整次遍历的提取故障。只有 `Timeout` 会中止遍历。
    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum ExtractionFault {
        #[error("extraction timed out after {elapsed_ms} ms")]
        Timeout { elapsed_ms: u128 },
        #[error("unsupported geometry: {0}")]
        UnsupportedGeometry(String),
        #[error("degenerate geometry: {0}")]
        Degenerate(String),
    }

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum QuoteError {
        #[error("invalid material or thickness: {material} @ {thickness} in")]
        InvalidMaterialOrThickness { material: String, thickness: f64 },
        #[error("material {material} has no density entry")]
        MaterialNotFound { material: String },
        #[error("part {part_id} is missing material or thickness")]
        MissingMaterialOrThickness { part_id: String },
    }
}

use std::path::Path;

use plasmaq_config::ExtractionConfig;
use plasmaq_core::document::Document;
use plasmaq_io::{DocumentLoader, DxfFacade, IoError};
use tracing::{error, info};

pub use costing::{
    CartItem, CostBreakdown, ExcludedItem, ExclusionReason, LineItem, calculate_costs,
    validate_cart,
};
pub use errors::{ExtractionFault, QuoteError};
pub use material::{ALLOWED_THICKNESSES, Material, PartSpec};
pub use result::{EntityCounts, EntityKind, GeometryRecord, ParseFailure, ParseResult, PartWeights};

/// 对已加载的文档执行完整提取：遍历、拓扑判定、结果组装。
pub fn extract_document(document: &Document, config: &ExtractionConfig) -> ParseResult {
    let outcome = extract::extract(document, config);
    assemble::assemble(outcome, config)
}

/// 读取并提取 DXF 文件。文件缺失或损坏时返回带 `FileUnreadable` 标记的零结果。
pub fn parse_dxf_file(path: impl AsRef<Path>, config: &ExtractionConfig) -> ParseResult {
    let path = path.as_ref();
    let loaded = DxfFacade::new().load(path);
    let result = finish_load(loaded, config);
    if result.failure.is_none() {
        info!(
            path = %path.display(),
            length = result.total_cut_length,
            net_area = result.net_area,
            gross_area = result.gross_area,
            pierces = result.pierce_count,
            "DXF 提取完成"
        );
    }
    result
}

/// 从内存中的 DXF 字节提取，非 UTF-8 内容按有损方式解码。
pub fn parse_dxf_bytes(bytes: &[u8], config: &ExtractionConfig) -> ParseResult {
    finish_load(DxfFacade::new().load_bytes(bytes), config)
}

pub fn parse_dxf_str(source: &str, config: &ExtractionConfig) -> ParseResult {
    finish_load(DxfFacade::new().load_str(source), config)
}

fn finish_load(loaded: Result<Document, IoError>, config: &ExtractionConfig) -> ParseResult {
    match loaded {
        Ok(document) => extract_document(&document, config),
        Err(err) => {
            error!(error = %err, "无法读取 DXF 文档");
            assemble::unreadable(&err.to_string())
        }
    }
}
