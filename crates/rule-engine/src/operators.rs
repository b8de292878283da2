//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
///
/// 每个变体对应一个纯函数语义，由 [`crate::evaluator::ConditionEvaluator`] 实现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 字符串比较（两侧均先转字符串）
    Equals,
    NotEquals,

    // 区分大小写的子串检查
    Contains,
    NotContains,

    // 正则匹配
    Matches,

    // 与配置自带的辅助列表比对
    InList,

    // 数值比较
    LessThan,
    GreaterThan,

    // 时间操作
    LessThanDaysAgo,
}

impl Operator {
    pub const ALL: [Operator; 9] = [
        Self::Equals,
        Self::NotEquals,
        Self::Contains,
        Self::NotContains,
        Self::Matches,
        Self::InList,
        Self::LessThan,
        Self::GreaterThan,
        Self::LessThanDaysAgo,
    ];

    /// 配置中使用的名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Matches => "matches",
            Self::InList => "in_list",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
            Self::LessThanDaysAgo => "less_than_days_ago",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    /// 严格解析，仅接受 `AND` / `OR` 原文
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            _ => None,
        }
    }

    /// 宽松解析：缺失或无法识别时回退为 AND
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or_default()
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_names_match_serde() {
        for op in Operator::ALL {
            let json = serde_json::to_string(&op).unwrap();
            assert_eq!(json, format!("\"{}\"", op.name()));
        }
    }

    #[test]
    fn test_logic_parse() {
        assert_eq!(LogicalOperator::parse("OR"), Some(LogicalOperator::Or));
        assert_eq!(LogicalOperator::parse("AND"), Some(LogicalOperator::And));
        assert_eq!(LogicalOperator::parse("or"), None);
        assert_eq!(LogicalOperator::parse(" Or "), None);
        assert_eq!(LogicalOperator::parse("XOR"), None);
    }

    #[test]
    fn test_logic_defaults_to_and() {
        assert_eq!(LogicalOperator::parse_or_default(None), LogicalOperator::And);
        assert_eq!(
            LogicalOperator::parse_or_default(Some("maybe")),
            LogicalOperator::And
        );
        assert_eq!(
            LogicalOperator::parse_or_default(Some("or")),
            LogicalOperator::And
        );
        assert_eq!(
            LogicalOperator::parse_or_default(Some("OR")),
            LogicalOperator::Or
        );
    }
}
