//! 列转换与格式化
//!
//! 转换和格式都是 `FieldValue -> FieldValue` 的纯函数，名称到函数的映射登记在
//! [`crate::allowlist`] 中。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::FieldValue;

/// 截断上限（字符数，不含省略标记）
pub const TRUNCATE_LIMIT: usize = 50;

/// 截断后追加的省略标记
pub const ELLIPSIS: &str = "...";

/// 列转换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transformation {
    Upcase,
    Downcase,
    Strip,
    ToS,
    ToI,
    Truncate,
    First,
    Last,
}

impl Transformation {
    pub const ALL: [Transformation; 8] = [
        Self::Upcase,
        Self::Downcase,
        Self::Strip,
        Self::ToS,
        Self::ToI,
        Self::Truncate,
        Self::First,
        Self::Last,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Upcase => "upcase",
            Self::Downcase => "downcase",
            Self::Strip => "strip",
            Self::ToS => "to_s",
            Self::ToI => "to_i",
            Self::Truncate => "truncate",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    pub fn apply(&self, value: FieldValue) -> FieldValue {
        match self {
            Self::Upcase => FieldValue::Text(value.to_string().to_uppercase()),
            Self::Downcase => FieldValue::Text(value.to_string().to_lowercase()),
            Self::Strip => FieldValue::Text(value.to_string().trim().to_string()),
            Self::ToS => FieldValue::Text(value.to_string()),
            Self::ToI => FieldValue::Int(to_integer(&value)),
            Self::Truncate => FieldValue::Text(truncate(&value.to_string())),
            Self::First => FieldValue::Text(value.to_string().chars().take(1).collect()),
            Self::Last => FieldValue::Text(
                value
                    .to_string()
                    .chars()
                    .last()
                    .map(String::from)
                    .unwrap_or_default(),
            ),
        }
    }
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 宽松整数转换：字符串取前导整数部分，无法识别时为 0
fn to_integer(value: &FieldValue) -> i64 {
    match value {
        FieldValue::Int(i) => *i,
        FieldValue::Float(f) => f.trunc() as i64,
        FieldValue::Time(t) => t.timestamp(),
        FieldValue::Text(s) => leading_integer(s),
        FieldValue::Null | FieldValue::Bool(_) | FieldValue::Date(_) => 0,
    }
}

fn leading_integer(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|n| sign * n)
        .unwrap_or(0)
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= TRUNCATE_LIMIT {
        return s.to_string();
    }
    let mut out: String = s.chars().take(TRUNCATE_LIMIT).collect();
    out.push_str(ELLIPSIS);
    out
}

/// 列格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Currency,
    Integer,
    Date,
    Percentage,
}

impl Format {
    pub const ALL: [Format; 4] = [Self::Currency, Self::Integer, Self::Date, Self::Percentage];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Integer => "integer",
            Self::Date => "date",
            Self::Percentage => "percentage",
        }
    }

    /// 应用格式；无法转换时原样返回格式化前的值
    pub fn apply(&self, value: FieldValue) -> FieldValue {
        let formatted = match self {
            Self::Currency => value.as_number().map(|n| FieldValue::Text(format!("{:.2}", n))),
            Self::Integer => value.as_number().map(|n| FieldValue::Int(n.trunc() as i64)),
            Self::Date => coerce_date(&value).map(FieldValue::Date),
            Self::Percentage => value
                .as_number()
                .map(|n| FieldValue::Text(format!("{:.1}%", n * 100.0))),
        };
        formatted.unwrap_or(value)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn coerce_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Date(d) => Some(*d),
        FieldValue::Time(t) => Some(t.date_naive()),
        FieldValue::Text(s) => parse_date(s.trim()),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    // 取时间戳书写时所在时区的日期
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.date_naive());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn text(s: &str) -> FieldValue {
        FieldValue::from(s)
    }

    #[test]
    fn test_case_and_whitespace() {
        let value = Transformation::Upcase.apply(text("  john  "));
        let value = Transformation::Strip.apply(value);
        assert_eq!(value, text("JOHN"));
        assert_eq!(Transformation::Downcase.apply(text("MiXeD")), text("mixed"));
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(100);
        let out = Transformation::Truncate.apply(text(&long)).to_string();
        assert!(out.chars().count() <= TRUNCATE_LIMIT + ELLIPSIS.len());
        assert!(out.ends_with(ELLIPSIS));

        let short = "short".to_string();
        assert_eq!(Transformation::Truncate.apply(text(&short)), text("short"));
        let exact = "y".repeat(TRUNCATE_LIMIT);
        assert_eq!(Transformation::Truncate.apply(text(&exact)).to_string(), exact);
    }

    #[test]
    fn test_first_last() {
        assert_eq!(Transformation::First.apply(text("Berlin")), text("B"));
        assert_eq!(Transformation::Last.apply(text("Berlin")), text("n"));
        assert_eq!(Transformation::First.apply(FieldValue::Null), text(""));
        assert_eq!(Transformation::Last.apply(text("")), text(""));
        assert_eq!(Transformation::First.apply(text("Ölm")), text("Ö"));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Transformation::ToS.apply(FieldValue::Int(5)), text("5"));
        assert_eq!(Transformation::ToI.apply(text("12.7abc")), FieldValue::Int(12));
        assert_eq!(Transformation::ToI.apply(text("-3")), FieldValue::Int(-3));
        assert_eq!(Transformation::ToI.apply(text("abc")), FieldValue::Int(0));
        assert_eq!(Transformation::ToI.apply(FieldValue::Float(-9.9)), FieldValue::Int(-9));
    }

    #[test]
    fn test_numeric_formats() {
        assert_eq!(Format::Currency.apply(text("12.5")), text("12.50"));
        assert_eq!(Format::Currency.apply(FieldValue::Int(3)), text("3.00"));
        assert_eq!(Format::Integer.apply(FieldValue::Float(-7.8)), FieldValue::Int(-7));
        assert_eq!(Format::Percentage.apply(FieldValue::Float(0.256)), text("25.6%"));
        // 非数值保持原值
        assert_eq!(Format::Currency.apply(text("n/a")), text("n/a"));
    }

    #[test]
    fn test_date_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 23, 15, 0).unwrap();
        assert_eq!(Format::Date.apply(FieldValue::Time(t)).to_string(), "2024-03-09");
        assert_eq!(
            Format::Date.apply(text("2024-03-09 10:00:00")).to_string(),
            "2024-03-09"
        );
        assert_eq!(Format::Date.apply(text("09.03.2024")).to_string(), "2024-03-09");
        assert_eq!(
            Format::Date.apply(text("2024-01-15T01:00:00+02:00")).to_string(),
            "2024-01-15"
        );
        assert_eq!(Format::Date.apply(text("not a date")), text("not a date"));
        assert_eq!(Format::Date.apply(FieldValue::Int(5)), FieldValue::Int(5));
    }
}
