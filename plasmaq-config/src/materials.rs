use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use crate::ConfigError;

/// 材料密度表（lb/in³），由带表头的逗号分隔文本读取。
#[derive(Debug, Clone, Default)]
pub struct MaterialDensities {
    entries: Vec<(String, f64)>,
}

impl MaterialDensities {
    /// 表头需包含 `material` 与 `density` 两列，列顺序不限，允许多余列。
    /// 缺少必需列时返回空表。
    pub fn parse(text: &str) -> Self {
        let mut lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));

        let Some(header) = lines.next() else {
            warn!("材料密度表为空");
            return Self::default();
        };
        let columns: Vec<String> = split_record(header)
            .iter()
            .map(|column| column.to_ascii_lowercase())
            .collect();
        let material_col = columns.iter().position(|c| c == "material");
        let density_col = columns.iter().position(|c| c == "density");
        let (Some(material_col), Some(density_col)) = (material_col, density_col) else {
            error!(header, "材料密度表缺少 material/density 列");
            return Self::default();
        };

        let mut entries = Vec::new();
        for line in lines {
            let fields = split_record(line);
            let (Some(name), Some(raw_density)) = (fields.get(material_col), fields.get(density_col))
            else {
                warn!(line, "材料密度行字段不足，已跳过");
                continue;
            };
            match raw_density.parse::<f64>() {
                Ok(density) if !name.is_empty() => entries.push((name.clone(), density)),
                Ok(_) => warn!(line, "材料名称为空，已跳过"),
                Err(_) => warn!(material = %name, value = %raw_density, "材料密度无效，已跳过"),
            }
        }
        info!(count = entries.len(), "已加载材料密度表");
        Self { entries }
    }

    /// 读取密度表文件；文件不可读时返回空表，之后的查询全部失败。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "无法读取材料密度表");
                Self::default()
            }
        }
    }

    pub fn with_density(mut self, material: impl Into<String>, density: f64) -> Self {
        self.entries.push((material.into(), density));
        self
    }

    /// 按名称查找密度（忽略大小写与首尾空白）。
    pub fn density(&self, material: &str) -> Result<f64, ConfigError> {
        let wanted = material.trim();
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, density)| *density)
            .ok_or_else(|| ConfigError::MaterialNotFound {
                material: wanted.to_string(),
            })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 按逗号切分一行，字段可用双引号包裹（内部 `""` 表示一个引号）。字段去掉首尾空白。
pub(crate) fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' if quoted => quoted = false,
            '"' if field.trim().is_empty() => {
                field.clear();
                quoted = true;
            }
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}
