use std::fmt;

/// 报价参数使用的物理单位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unit {
    Hour,
    Minute,
    Second,
    DollarsPerHour,
    DollarsPerMinute,
    InchesPerMinute,
    Inch,
    DollarsPerPound,
    Unitless,
    Other(String),
}

impl Unit {
    /// 解析输入表中的单位字段，大小写与首尾空白不敏感。
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hour" | "hours" | "hr" | "h" => Unit::Hour,
            "min" | "mins" | "minute" | "minutes" => Unit::Minute,
            "sec" | "secs" | "second" | "seconds" | "s" => Unit::Second,
            "$/hour" | "$/hr" | "$/h" => Unit::DollarsPerHour,
            "$/min" => Unit::DollarsPerMinute,
            "in/min" | "ipm" => Unit::InchesPerMinute,
            "in" | "inch" | "inches" => Unit::Inch,
            "$/lb" => Unit::DollarsPerPound,
            "" | "unitless" | "none" => Unit::Unitless,
            _ => Unit::Other(raw.trim().to_string()),
        }
    }

    /// 时间类单位换算为秒的系数。
    fn seconds_factor(&self) -> Option<f64> {
        match self {
            Unit::Hour => Some(3600.0),
            Unit::Minute => Some(60.0),
            Unit::Second => Some(1.0),
            _ => None,
        }
    }

    /// 费率类单位换算为 $/min 的系数。
    fn per_minute_factor(&self) -> Option<f64> {
        match self {
            Unit::DollarsPerHour => Some(1.0 / 60.0),
            Unit::DollarsPerMinute => Some(1.0),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Unit::Hour => "hour",
            Unit::Minute => "min",
            Unit::Second => "sec",
            Unit::DollarsPerHour => "$/hour",
            Unit::DollarsPerMinute => "$/min",
            Unit::InchesPerMinute => "in/min",
            Unit::Inch => "in",
            Unit::DollarsPerPound => "$/lb",
            Unit::Unitless => "unitless",
            Unit::Other(name) => name,
        };
        f.write_str(text)
    }
}

/// 单位换算结果。`Unchanged` 表示没有登记的换算关系，数值原样返回。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitConversion {
    Converted(f64),
    Unchanged(f64),
}

impl UnitConversion {
    #[inline]
    pub fn value(self) -> f64 {
        match self {
            UnitConversion::Converted(value) | UnitConversion::Unchanged(value) => value,
        }
    }

    #[inline]
    pub fn is_converted(self) -> bool {
        matches!(self, UnitConversion::Converted(_))
    }
}

/// 在时间族（hour/min/sec）与费率族（$/hour、$/min）内换算；同一单位恒等换算。
pub fn convert(value: f64, from: &Unit, to: &Unit) -> UnitConversion {
    if from == to {
        return UnitConversion::Converted(value);
    }
    if let (Some(from_secs), Some(to_secs)) = (from.seconds_factor(), to.seconds_factor()) {
        return UnitConversion::Converted(value * from_secs / to_secs);
    }
    if let (Some(from_rate), Some(to_rate)) = (from.per_minute_factor(), to.per_minute_factor()) {
        return UnitConversion::Converted(value * from_rate / to_rate);
    }
    UnitConversion::Unchanged(value)
}
