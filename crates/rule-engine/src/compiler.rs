//! 规则编译器
//!
//! 将规则文档 JSON 解析并编译成内存中的执行结构：操作符查表、期望值预转换、正则预编译。
//! 单个条件编译失败只会让该条件恒为不匹配，不影响同一文档中的其他条件。

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allowlist::allow_list;
use crate::error::{Result, RuleError};
use crate::lists::DATA_LIST;
use crate::operators::{LogicalOperator, Operator};

/// 规则文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDocument {
    pub conditions: Vec<ConditionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<String>,
}

/// 条件定义（持久化形式，名称尚未经过白名单解析）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

/// 预转换后的期望值
#[derive(Debug, Clone)]
pub enum Operand {
    Text(String),
    Number(f64),
    Pattern(Regex),
    DataList,
}

/// 编译后的条件
#[derive(Debug, Clone)]
pub struct CompiledCondition {
    /// 条件在文档中的位置
    pub index: usize,
    pub field: String,
    pub operator_name: String,
    /// 编译失败时保存原因，执行时该条件恒为 false
    pub compiled: std::result::Result<(Operator, Operand), String>,
}

impl CompiledCondition {
    pub fn is_valid(&self) -> bool {
        self.compiled.is_ok()
    }
}

/// 编译后的规则集
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub conditions: Vec<CompiledCondition>,
    pub logic: LogicalOperator,
}

impl CompiledRuleSet {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// 规则编译器
pub struct RuleCompiler;

impl RuleCompiler {
    /// 从 JSON 字符串编译规则
    ///
    /// 文档自身的 `logic` 优先；缺失时使用配置上的 `fallback_logic`，仍缺失则为 AND。
    pub fn compile_from_json(json: &str, fallback_logic: Option<&str>) -> Result<CompiledRuleSet> {
        let document: RuleDocument = serde_json::from_str(json)
            .map_err(|e| RuleError::MalformedDocument(e.to_string()))?;
        Ok(Self::compile(&document, fallback_logic))
    }

    /// 编译规则文档
    pub fn compile(document: &RuleDocument, fallback_logic: Option<&str>) -> CompiledRuleSet {
        let logic = LogicalOperator::parse_or_default(document.logic.as_deref().or(fallback_logic));

        let conditions = document
            .conditions
            .iter()
            .enumerate()
            .map(|(index, spec)| Self::compile_condition(index, spec))
            .collect();

        CompiledRuleSet { conditions, logic }
    }

    /// 编译单个条件：字段、操作符都必须在白名单中，期望值必须与操作符兼容
    pub fn compile_condition(index: usize, spec: &ConditionSpec) -> CompiledCondition {
        let compiled = if !allow_list().is_field_allowed(&spec.field) {
            Err(format!("field '{}' not allowed", spec.field))
        } else {
            match allow_list().operator(&spec.operator) {
                Some(operator) => compile_operand(operator, &spec.value).map(|o| (operator, o)),
                None => Err(format!("operator '{}' not allowed", spec.operator)),
            }
        };

        CompiledCondition {
            index,
            field: spec.field.clone(),
            operator_name: spec.operator.clone(),
            compiled,
        }
    }
}

/// 校验期望值与操作符的兼容性并预转换
pub fn compile_operand(operator: Operator, value: &Value) -> std::result::Result<Operand, String> {
    match operator {
        Operator::Equals | Operator::NotEquals | Operator::Contains | Operator::NotContains => {
            Ok(Operand::Text(json_text(value)))
        }
        Operator::Matches => {
            let pattern = json_text(value);
            Regex::new(&pattern)
                .map(Operand::Pattern)
                .map_err(|e| format!("pattern '{}' is not a valid regex: {}", pattern, e))
        }
        Operator::InList => {
            if json_text(value) == DATA_LIST {
                Ok(Operand::DataList)
            } else {
                Err(format!("in_list value must be {}", DATA_LIST))
            }
        }
        Operator::LessThan | Operator::GreaterThan | Operator::LessThanDaysAgo => json_number(value)
            .map(Operand::Number)
            .ok_or_else(|| format!("value '{}' for {} is not numeric", json_text(value), operator)),
    }
}

/// JSON 标量转字符串：字符串取原文，null 为空串，其余取 JSON 文本
pub fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
