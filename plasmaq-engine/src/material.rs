use std::fmt;

use serde::Serialize;

use crate::errors::QuoteError;

/// 可报价的板厚（英寸）。
pub const ALLOWED_THICKNESSES: [f64; 6] = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0];

const THICKNESS_TOLERANCE: f64 = 1e-9;

/// 可报价的材料，名称与密度表中的 `material` 列一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Material {
    #[serde(rename = "A36 Steel")]
    A36Steel,
    #[serde(rename = "Stainless 304")]
    Stainless304,
    #[serde(rename = "Stainless 316")]
    Stainless316,
    #[serde(rename = "Aluminum 3003")]
    Aluminum3003,
    #[serde(rename = "Aluminum 6061")]
    Aluminum6061,
}

impl Material {
    pub const ALL: [Material; 5] = [
        Material::A36Steel,
        Material::Stainless304,
        Material::Stainless316,
        Material::Aluminum3003,
        Material::Aluminum6061,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Material::A36Steel => "A36 Steel",
            Material::Stainless304 => "Stainless 304",
            Material::Stainless316 => "Stainless 316",
            Material::Aluminum3003 => "Aluminum 3003",
            Material::Aluminum6061 => "Aluminum 6061",
        }
    }

    /// 名称需完全一致（仅忽略首尾空白）。
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = name.trim();
        Self::ALL.into_iter().find(|material| material.name() == wanted)
    }
}

impl fmt::Display for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 经过校验的材料与板厚组合。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PartSpec {
    pub material: Material,
    pub thickness: f64,
}

impl PartSpec {
    pub fn new(material: &str, thickness: f64) -> Result<Self, QuoteError> {
        let invalid = || QuoteError::InvalidMaterialOrThickness {
            material: material.to_string(),
            thickness,
        };
        let parsed = Material::from_name(material).ok_or_else(invalid)?;
        let allowed = ALLOWED_THICKNESSES
            .iter()
            .find(|allowed| (*allowed - thickness).abs() < THICKNESS_TOLERANCE)
            .ok_or_else(invalid)?;
        Ok(Self {
            material: parsed,
            thickness: *allowed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_catalogue_pairs() {
        let spec = PartSpec::new("Stainless 316", 0.75).unwrap();
        assert_eq!(spec.material, Material::Stainless316);
        assert_eq!(spec.thickness, 0.75);
        assert_eq!(spec.material.to_string(), "Stainless 316");
        assert_eq!(Material::from_name(" A36 Steel "), Some(Material::A36Steel));
    }

    #[test]
    fn rejects_unknown_material_or_thickness() {
        let err = PartSpec::new("Titanium", 0.5).unwrap_err();
        assert_eq!(
            err,
            QuoteError::InvalidMaterialOrThickness {
                material: "Titanium".to_string(),
                thickness: 0.5,
            }
        );
        assert!(PartSpec::new("A36 Steel", 0.3).is_err());
        assert!(PartSpec::new("a36 steel", 0.5).is_err());
        assert!(PartSpec::new("Aluminum 6061", 0.0).is_err());
    }

    #[test]
    fn serializes_with_catalogue_names() {
        let value = serde_json::to_value(Material::Aluminum3003).unwrap();
        assert_eq!(value, "Aluminum 3003");
    }
}
