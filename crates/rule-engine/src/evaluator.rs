//! 条件评估器
//!
//! 实现各操作符的纯函数语义。所有失败都以 `Err` 返回，由执行器降级为不匹配。

use chrono::{DateTime, Utc};

use crate::compiler::Operand;
use crate::error::{Result, RuleError};
use crate::operators::Operator;
use crate::record::FieldValue;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    ///
    /// # Arguments
    /// * `field_value` - 从记录读取的字段值，读取失败时为 `Null`
    /// * `operator` - 操作符
    /// * `operand` - 编译期预转换的期望值
    /// * `list` - 配置自带的辅助列表（`in_list` 使用）
    /// * `now` - 时间类操作符的参照时间
    pub fn evaluate(
        field_value: &FieldValue,
        operator: Operator,
        operand: &Operand,
        list: &[String],
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match (operator, operand) {
            (Operator::Equals, Operand::Text(expected)) => Ok(field_value.to_string() == *expected),
            (Operator::NotEquals, Operand::Text(expected)) => {
                Ok(field_value.to_string() != *expected)
            }
            (Operator::Contains, Operand::Text(expected)) => {
                Ok(field_value.to_string().contains(expected.as_str()))
            }
            (Operator::NotContains, Operand::Text(expected)) => {
                Ok(!field_value.to_string().contains(expected.as_str()))
            }
            (Operator::Matches, Operand::Pattern(regex)) => {
                Ok(regex.is_match(&field_value.to_string()))
            }
            (Operator::InList, Operand::DataList) => {
                let value = field_value.to_string();
                Ok(list.iter().any(|entry| *entry == value))
            }
            (Operator::LessThan, Operand::Number(expected)) => {
                Self::compare(field_value, operator, *expected, |a, b| a < b)
            }
            (Operator::GreaterThan, Operand::Number(expected)) => {
                Self::compare(field_value, operator, *expected, |a, b| a > b)
            }
            (Operator::LessThanDaysAgo, Operand::Number(threshold)) => {
                let time = field_value.as_time().ok_or_else(|| {
                    RuleError::operator(
                        operator.name(),
                        format!("{} value is not time-like", Self::type_name(field_value)),
                    )
                })?;
                Ok(elapsed_days(now, time) < *threshold)
            }
            _ => Err(RuleError::operator(
                operator.name(),
                "operand does not fit operator",
            )),
        }
    }

    /// 数值比较
    fn compare<F>(field: &FieldValue, operator: Operator, expected: f64, cmp: F) -> Result<bool>
    where
        F: Fn(f64, f64) -> bool,
    {
        let actual = field.as_number().ok_or_else(|| {
            RuleError::operator(
                operator.name(),
                format!("{} value is not numeric", Self::type_name(field)),
            )
        })?;

        Ok(cmp(actual, expected))
    }

    /// 获取值的类型名称
    fn type_name(value: &FieldValue) -> &'static str {
        match value {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "boolean",
            FieldValue::Int(_) | FieldValue::Float(_) => "number",
            FieldValue::Text(_) => "string",
            FieldValue::Time(_) => "time",
            FieldValue::Date(_) => "date",
        }
    }
}

/// 从 `then` 到 `now` 经过的天数（含小数，未来时间为负）
pub fn elapsed_days(now: DateTime<Utc>, then: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / MILLIS_PER_DAY
}
