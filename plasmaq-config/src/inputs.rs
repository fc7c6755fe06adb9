use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::materials::split_record;
use crate::units::{Unit, UnitConversion, convert};

/// 报价参数表的全部已知键及其默认值 `(键, 数值, 单位)`。
pub const DEFAULT_COST_INPUTS: &[(&str, f64, &str)] = &[
    ("direct_labor_rate", 0.0, "$/hour"),
    ("machine_rate_per_min", 0.0, "$/min"),
    ("cut_speed_0.375", 60.0, "in/min"),
    ("cut_speed_0.75", 40.0, "in/min"),
    ("cut_speed_1.0", 25.0, "in/min"),
    ("order_setup_time", 0.0, "min"),
    ("thickness_changeover_time", 0.0, "min"),
    ("plate_change_time", 0.0, "min"),
    ("pierce_time", 0.0, "sec"),
    ("cleanup_assembly_time_thick", 45.0, "sec"),
    ("cleanup_assembly_time_thin", 15.0, "sec"),
    ("steel_cost_per_lb", 0.0, "$/lb"),
    ("kerf_thickness", 0.05, "in"),
    ("skeleton_thickness", 0.1, "in"),
    ("margin", 0.0, "unitless"),
    ("travel_speed", 0.0, "in/min"),
    ("material_efficiency", 0.9, "unitless"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CostInput {
    pub value: f64,
    pub unit: Unit,
}

impl CostInput {
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// 已知键的默认值；未登记的键为 `(0.0, unitless)`。
    pub fn default_for(key: &str) -> Self {
        DEFAULT_COST_INPUTS
            .iter()
            .find(|(name, _, _)| *name == key)
            .map(|(_, value, unit)| Self::new(*value, Unit::parse(unit)))
            .unwrap_or_else(|| Self::new(0.0, Unit::Unitless))
    }
}

/// `key,value,unit` 形式的报价参数表。查询永不失败，缺失的键回落到默认值。
#[derive(Debug, Clone, Default)]
pub struct CostInputs {
    entries: HashMap<String, CostInput>,
}

impl CostInputs {
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts = split_record(line);
            if parts.len() < 3 {
                warn!(line = index + 1, content = line, "报价参数行字段不足，已跳过");
                continue;
            }
            let (key, raw_value, raw_unit) = (parts[0].as_str(), parts[1].as_str(), parts[2].as_str());
            if !DEFAULT_COST_INPUTS.iter().any(|(name, _, _)| *name == key) {
                debug!(key, "忽略未知的报价参数");
                continue;
            }
            let input = match raw_value.parse::<f64>() {
                Ok(value) => CostInput::new(value, Unit::parse(raw_unit)),
                Err(_) => {
                    let fallback = CostInput::default_for(key);
                    warn!(
                        key,
                        value = raw_value,
                        default = fallback.value,
                        "报价参数数值无效，使用默认值"
                    );
                    fallback
                }
            };
            entries.insert(key.to_string(), input);
        }
        Self { entries }
    }

    /// 读取参数文件；文件不可读时记录警告并全部使用默认值。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "无法读取报价参数表，使用默认值");
                Self::default()
            }
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: f64, unit: Unit) -> Self {
        self.entries.insert(key.into(), CostInput::new(value, unit));
        self
    }

    /// 表中显式给出了该键。
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> CostInput {
        match self.entries.get(key) {
            Some(input) => input.clone(),
            None => {
                let fallback = CostInput::default_for(key);
                debug!(key, value = fallback.value, "报价参数缺失，使用默认值");
                fallback
            }
        }
    }

    #[inline]
    pub fn value(&self, key: &str) -> f64 {
        self.get(key).value
    }

    /// 时间类参数换算为分钟。
    pub fn minutes(&self, key: &str) -> f64 {
        self.converted(key, &Unit::Minute)
    }

    /// 费率类参数换算为 $/min。
    pub fn per_minute(&self, key: &str) -> f64 {
        self.converted(key, &Unit::DollarsPerMinute)
    }

    fn converted(&self, key: &str, target: &Unit) -> f64 {
        let input = self.get(key);
        match convert(input.value, &input.unit, target) {
            UnitConversion::Converted(value) => value,
            UnitConversion::Unchanged(value) => {
                warn!(key, from = %input.unit, to = %target, "没有对应的单位换算，按原值使用");
                value
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
# key,value,unit
direct_labor_rate,90,$/hour
machine_rate_per_min,2.5,$/min
pierce_time,6,sec
order_setup_time,0.5,hour
margin,0.3,unitless

cut_speed_0.375,not-a-number,in/min
kerf_thickness,0.06
bogus_key,12,min
";

    #[test]
    fn parse_reads_values_and_units() {
        let inputs = CostInputs::parse(SAMPLE);
        assert_eq!(inputs.get("direct_labor_rate"), CostInput::new(90.0, Unit::DollarsPerHour));
        assert!((inputs.per_minute("direct_labor_rate") - 1.5).abs() < 1e-12);
        assert!((inputs.minutes("pierce_time") - 0.1).abs() < 1e-12);
        assert!((inputs.minutes("order_setup_time") - 30.0).abs() < 1e-12);
        assert!((inputs.value("margin") - 0.3).abs() < 1e-12);
    }

    #[test]
    fn malformed_and_short_lines_fall_back_to_defaults() {
        let inputs = CostInputs::parse(SAMPLE);
        // 数值无效时使用该键的默认值
        assert_eq!(inputs.value("cut_speed_0.375"), 60.0);
        // 字段不足的行被跳过
        assert!(!inputs.contains("kerf_thickness"));
        assert_eq!(inputs.value("kerf_thickness"), 0.05);
        assert!(!inputs.contains("bogus_key"));
    }

    #[test]
    fn missing_keys_resolve_to_documented_defaults() {
        let inputs = CostInputs::default();
        for (key, value, unit) in DEFAULT_COST_INPUTS {
            let input = inputs.get(key);
            assert_eq!(input.value, *value, "{key}");
            assert_eq!(input.unit, Unit::parse(unit), "{key}");
        }
        assert_eq!(inputs.get("unheard_of"), CostInput::new(0.0, Unit::Unitless));
        assert!((inputs.minutes("cleanup_assembly_time_thick") - 0.75).abs() < 1e-12);
        assert!((inputs.value("material_efficiency") - 0.9).abs() < 1e-12);
    }

    #[test]
    fn quoted_fields_are_unwrapped() {
        let inputs = CostInputs::parse("\"pierce_time\",\"12\",\"s\"\n");
        assert!((inputs.minutes("pierce_time") - 0.2).abs() < 1e-12);
    }

    #[test]
    fn unconvertible_unit_keeps_raw_value() {
        let inputs = CostInputs::default().with_input("pierce_time", 4.0, Unit::Inch);
        assert_eq!(inputs.minutes("pierce_time"), 4.0);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let inputs = CostInputs::load("/nonexistent/inputs.csv");
        assert_eq!(inputs.value("cut_speed_1.0"), 25.0);

        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        write!(file, "margin,0.25,unitless\n").unwrap();
        let inputs = CostInputs::load(file.path());
        assert_eq!(inputs.value("margin"), 0.25);
    }
}
