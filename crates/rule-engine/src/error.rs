//! 规则引擎错误类型
//!
//! 除 `ConfigurationInvalid` 外，其余错误都在引擎内部最小范围内被捕获并降级为安全默认值，
//! 调用方只会拿到布尔值或报表行。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("配置无效: {}", .0.join("; "))]
    ConfigurationInvalid(Vec<String>),

    #[error("文档格式错误: {0}")]
    MalformedDocument(String),

    #[error("字段读取失败: {field} ({reason})")]
    ExtractionFailure { field: String, reason: String },

    #[error("操作符执行失败: {operator} ({reason})")]
    OperatorFailure { operator: String, reason: String },

    #[error("旧版表达式执行失败: {0}")]
    LegacyEvaluationFailure(String),

    #[error("配置未找到: {0}")]
    ConfigurationNotFound(String),
}

impl RuleError {
    pub(crate) fn extraction(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExtractionFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn operator(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperatorFailure {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    /// 指标标签用的简短分类名
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationInvalid(_) => "configuration_invalid",
            Self::MalformedDocument(_) => "malformed_document",
            Self::ExtractionFailure { .. } => "extraction_failure",
            Self::OperatorFailure { .. } => "operator_failure",
            Self::LegacyEvaluationFailure(_) => "legacy_evaluation_failure",
            Self::ConfigurationNotFound(_) => "configuration_not_found",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
