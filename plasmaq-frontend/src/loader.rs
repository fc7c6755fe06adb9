use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use plasmaq_config::{AppConfig, ConfigError, ExtractionConfig};
use plasmaq_engine::{ParseResult, PartWeights, assemble, parse_dxf_file};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::errors::FrontendError;

/// 单张图纸的提取结果及其来源。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedDrawing {
    pub path: PathBuf,
    pub result: ParseResult,
    /// 指定材料与板厚后才有值。
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weights: Option<PartWeights>,
}

impl ExtractedDrawing {
    /// 报价单中的零件编号取文件名。
    pub fn part_id(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// 展开命令行给出的路径：目录递归收集 `.dxf`（不区分大小写），文件原样保留。
/// 不存在的路径也保留，交由提取阶段报告为不可读。
pub fn collect_drawings(paths: &[PathBuf]) -> Result<Vec<PathBuf>, FrontendError> {
    let mut drawings = Vec::new();
    for path in paths {
        if !path.is_dir() {
            drawings.push(path.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(path).follow_links(true) {
            let entry = entry.map_err(|source| FrontendError::Walk {
                path: path.clone(),
                source,
            })?;
            if entry.file_type().is_file() && is_dxf(entry.path()) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        if found.is_empty() {
            warn!(path = %path.display(), "目录中没有 DXF 文件");
        } else {
            debug!(path = %path.display(), count = found.len(), "收集目录中的 DXF 文件");
        }
        drawings.extend(found);
    }

    if drawings.is_empty() {
        return Err(FrontendError::NoDrawings(paths.to_vec()));
    }
    Ok(drawings)
}

fn is_dxf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dxf"))
}

/// 在 rayon 线程池上并行提取，结果顺序与输入一致。单张图纸的 panic 转为不可读结果。
pub fn extract_batch(paths: &[PathBuf], config: &ExtractionConfig) -> Vec<ExtractedDrawing> {
    info!(
        count = paths.len(),
        workers = rayon::current_num_threads(),
        "开始批量提取"
    );
    let drawings: Vec<ExtractedDrawing> = paths
        .par_iter()
        .map(|path| {
            let result = catch_unwind(AssertUnwindSafe(|| parse_dxf_file(path, config)))
                .unwrap_or_else(|_| {
                    warn!(path = %path.display(), "提取任务异常退出");
                    assemble::unreadable("extraction worker panicked")
                });
            ExtractedDrawing {
                path: path.clone(),
                result,
                weights: None,
            }
        })
        .collect();
    let failed = drawings.iter().filter(|d| d.result.is_failed()).count();
    if failed > 0 {
        warn!(failed, total = drawings.len(), "部分图纸提取失败");
    }
    drawings
}

/// 读取应用配置：显式路径优先，其次自动发现；失败时记录警告并使用内建默认值。
pub fn load_app_config(override_path: Option<&Path>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(config) => config,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    _ => warn!(error = %err, "加载默认配置失败，使用内建默认值"),
                }
                AppConfig::default()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plasmaq_engine::ParseFailure;
    use std::fs;

    const LINE_DXF: &str = "0\nSECTION\n2\nENTITIES\n0\nLINE\n8\nCUT\n10\n0\n20\n0\n11\n5\n21\n0\n0\nENDSEC\n0\nEOF\n";

    #[test]
    fn directories_are_walked_for_dxf_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.DXF"), LINE_DXF).unwrap();
        fs::write(dir.path().join("nested").join("a.dxf"), LINE_DXF).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let drawings = collect_drawings(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(drawings.len(), 2);
        assert!(drawings.iter().all(|path| is_dxf(path)));
    }

    #[test]
    fn empty_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_drawings(&[dir.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, FrontendError::NoDrawings(_)));
    }

    #[test]
    fn batch_keeps_input_order_and_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.dxf");
        fs::write(&good, LINE_DXF).unwrap();
        let missing = dir.path().join("missing.dxf");

        let paths = collect_drawings(&[missing.clone(), good.clone()]).unwrap();
        let drawings = extract_batch(&paths, &ExtractionConfig::default());
        assert_eq!(drawings.len(), 2);
        assert_eq!(drawings[0].path, missing);
        assert_eq!(drawings[0].result.failure, Some(ParseFailure::FileUnreadable));
        assert_eq!(drawings[1].part_id(), "good.dxf");
        assert!((drawings[1].result.total_cut_length - 5.0).abs() < 1e-9);
    }

    #[test]
    fn batch_larger_than_the_pool_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let count = rayon::current_num_threads() * 2 + 3;
        let paths: Vec<PathBuf> = (0..count)
            .map(|i| {
                let path = dir.path().join(format!("part-{i:03}.dxf"));
                let length = (i + 1).to_string();
                fs::write(&path, LINE_DXF.replace("11\n5\n", &format!("11\n{length}\n"))).unwrap();
                path
            })
            .collect();

        let drawings = extract_batch(&paths, &ExtractionConfig::default());
        assert_eq!(drawings.len(), count);
        for (i, drawing) in drawings.iter().enumerate() {
            assert_eq!(drawing.path, paths[i]);
            assert!((drawing.result.total_cut_length - (i + 1) as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let config = load_app_config(Some(Path::new("/nonexistent/plasmaq.toml")));
        assert_eq!(config.extraction.max_entities, 1000);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[extraction]\nmax_entities = 5\n").unwrap();
        let config = load_app_config(Some(file.path()));
        assert_eq!(config.extraction.max_entities, 5);
        assert_eq!(config.logging.level, "info");
    }
}
