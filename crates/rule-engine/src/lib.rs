//! 安全的记录筛查与报表行引擎
//!
//! 提供可复用的配置评估能力，支持：
//! - 基于白名单的 JSON 规则与转换文档校验
//! - 规则编译和按实例缓存
//! - 逐条件独立求值，失败降级为不匹配
//! - 按列构建报表行
//! - 旧版自由文本表达式兼容（已弃用）

pub mod allowlist;
pub mod cache;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod legacy;
pub mod lists;
pub mod models;
pub mod operators;
pub mod pipeline;
pub mod record;
pub mod store;
pub mod transforms;
pub mod validation;

pub use allowlist::{allow_list, AllowList};
pub use compiler::{CompiledRuleSet, ConditionSpec, RuleCompiler, RuleDocument};
pub use error::{Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use legacy::LegacyCode;
pub use lists::{parse_list, ListField, DATA_LIST};
pub use models::{
    ConfigurationBundle, EvaluationMode, EvaluationResult, MatchFilter, ReportTemplate,
};
pub use operators::{LogicalOperator, Operator};
pub use pipeline::{error_row, ColumnSpec, PipelineCompiler, Row, RowBuilder, TransformDocument};
pub use record::{AccessorTable, Accessible, FieldValue, JsonRecord, Record};
pub use store::{ConfigurationStore, ConfigurationStoreStats};
pub use transforms::{Format, Transformation};
pub use validation::{validate_rule_document, validate_transform_document};
