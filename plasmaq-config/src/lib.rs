use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

mod inputs;
mod materials;
mod units;

pub use inputs::{CostInput, CostInputs, DEFAULT_COST_INPUTS};
pub use materials::MaterialDensities;
pub use units::{Unit, UnitConversion, convert};

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub costing: CostingConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `PLASMAQ_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("PLASMAQ_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 默认切割图层（比较前统一做 trim + 小写）。
pub const DEFAULT_CUT_LAYERS: &[&str] = &[
    "0",
    "1",
    "layer 1",
    "plan 1",
    "cut",
    "cutting",
    "outline",
    "profile",
    "visible (ansi)",
    "defpoints",
    "pen_1",
    "pen_2",
    "pen_3",
    "pen_4",
    "pen_5",
];

/// 默认参考/构造图层：只出现在预览中，不计入切割长度。
pub const DEFAULT_REFERENCE_LAYERS: &[&str] = &[
    "reference",
    "ref",
    "center",
    "centerline",
    "construction",
    "hidden",
    "phantom",
    "axis",
    "dimension",
    "annotation",
    "text",
    "guide",
    "grid",
    "title",
    "border",
    "viewport",
    "sheet",
    "layout",
    "notes",
    "symbols",
    "markup",
    "background",
];

/// 几何提取的全部可调参数。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub cut_layers: Vec<String>,
    pub reference_layers: Vec<String>,
    /// 顶层实体数量上限。
    pub max_entities: usize,
    /// 块嵌套深度上限。
    pub max_recursion_depth: usize,
    pub timeout_seconds: f64,
    /// 样条展平的弦高容差（英寸）。
    pub spline_tolerance: f64,
    pub ellipse_segments: usize,
    /// 直线与圆弧端点相接的判定距离（英寸）。
    pub loop_tolerance: f64,
    /// 边界框单边尺寸上限（英寸），超出视为坐标异常。
    pub max_extent: f64,
    /// 图层 0 上存在可切割几何时，把图层 1 视为参考层。
    pub layer_one_is_reference: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cut_layers: DEFAULT_CUT_LAYERS.iter().map(|s| s.to_string()).collect(),
            reference_layers: DEFAULT_REFERENCE_LAYERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_entities: 1000,
            max_recursion_depth: 10,
            timeout_seconds: 30.0,
            spline_tolerance: 0.001,
            ellipse_segments: 64,
            loop_tolerance: 0.001,
            max_extent: 1_000_000.0,
            layer_one_is_reference: true,
        }
    }
}

impl ExtractionConfig {
    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = max_entities;
        self
    }

    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    pub fn with_max_extent(mut self, max_extent: f64) -> Self {
        self.max_extent = max_extent;
        self
    }

    pub fn with_cut_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cut_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_reference_layers<I, S>(mut self, layers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    /// 超时预算；负数或非有限值按 0 处理。
    pub fn timeout(&self) -> Duration {
        if self.timeout_seconds.is_finite() && self.timeout_seconds > 0.0 {
            Duration::from_secs_f64(self.timeout_seconds)
        } else {
            Duration::ZERO
        }
    }
}

/// 报价输入表的位置。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CostingConfig {
    #[serde(default)]
    pub inputs_path: Option<PathBuf>,
    #[serde(default)]
    pub densities_path: Option<PathBuf>,
}

impl CostingConfig {
    /// 读取报价参数；未配置路径时全部使用默认值。
    pub fn load_inputs(&self) -> CostInputs {
        match &self.inputs_path {
            Some(path) => CostInputs::load(path),
            None => CostInputs::default(),
        }
    }

    /// 读取材料密度表；未配置路径时返回空表。
    pub fn load_densities(&self) -> MaterialDensities {
        match &self.densities_path {
            Some(path) => MaterialDensities::load(path),
            None => MaterialDensities::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("材料 {material} 不在密度表中")]
    MaterialNotFound { material: String },
}
