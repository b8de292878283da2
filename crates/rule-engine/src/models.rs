//! 规则引擎领域模型
//!
//! `MatchFilter`（垃圾记录过滤规则）与 `ReportTemplate`（报表转换模板）是持久化的配置对象。
//! 引擎从不修改它们；编译结果、解析后的列表和旧版表达式按实例缓存，字段重新赋值时失效。

use chrono::{DateTime, Utc};
use screening_shared::observability::metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::cache::Memo;
use crate::compiler::{CompiledRuleSet, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::executor::RuleExecutor;
use crate::legacy::LegacyCode;
use crate::lists::ListField;
use crate::pipeline::{error_row, is_error_row, CompiledPipeline, PipelineCompiler, Row, RowBuilder, ERROR_CELL};
use crate::record::Record;
use crate::validation::{validate_logic, validate_rule_document, validate_transform_document};

/// 配置的求值方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// 结构化文档
    Structured,
    /// 旧版自由文本表达式
    Legacy,
    /// 两者都没有
    Empty,
}

impl EvaluationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Legacy => "legacy",
            Self::Empty => "empty",
        }
    }

    fn select(document: Option<&str>, legacy: &LegacyCode) -> Self {
        if document.is_some_and(|d| !d.trim().is_empty()) {
            Self::Structured
        } else if legacy.is_present() {
            Self::Legacy
        } else {
            Self::Empty
        }
    }
}

/// 评估结果
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub config_id: String,
    pub record_id: String,
    pub mode: EvaluationMode,
    pub matched_conditions: Vec<String>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: i64,
}

impl EvaluationResult {
    pub fn new(config_id: impl Into<String>, record_id: String, mode: EvaluationMode) -> Self {
        Self {
            matched: false,
            config_id: config_id.into(),
            record_id,
            mode,
            matched_conditions: Vec::new(),
            evaluation_trace: Vec::new(),
            evaluation_time_us: 0,
        }
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// 垃圾记录过滤规则
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_filter_documents"))]
pub struct MatchFilter {
    #[serde(default = "new_id")]
    pub id: String,
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[serde(default)]
    rules_json: Option<String>,
    /// 列级 logic，文档自带的 logic 优先
    #[serde(default)]
    logic: Option<String>,
    #[serde(default)]
    data: ListField,
    #[serde(default)]
    whitelist: ListField,
    #[serde(default)]
    blacklist: ListField,
    #[serde(default)]
    code: LegacyCode,
    #[serde(skip)]
    compiled: Memo<Result<CompiledRuleSet>>,
}

impl MatchFilter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            rules_json: None,
            logic: None,
            data: ListField::default(),
            whitelist: ListField::default(),
            blacklist: ListField::default(),
            code: LegacyCode::default(),
            compiled: Memo::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_rules(mut self, rules_json: impl Into<String>) -> Self {
        self.set_rules_json(Some(rules_json.into()));
        self
    }

    pub fn with_logic(mut self, logic: impl Into<String>) -> Self {
        self.set_logic(Some(logic.into()));
        self
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data.set(Some(data.into()));
        self
    }

    pub fn with_whitelist(mut self, whitelist: impl Into<String>) -> Self {
        self.whitelist.set(Some(whitelist.into()));
        self
    }

    pub fn with_blacklist(mut self, blacklist: impl Into<String>) -> Self {
        self.blacklist.set(Some(blacklist.into()));
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code.set(Some(code.into()));
        self
    }

    pub fn rules_json(&self) -> Option<&str> {
        self.rules_json.as_deref()
    }

    pub fn set_rules_json(&mut self, rules_json: Option<String>) {
        self.rules_json = rules_json;
        self.compiled.invalidate();
    }

    pub fn logic(&self) -> Option<&str> {
        self.logic.as_deref()
    }

    pub fn set_logic(&mut self, logic: Option<String>) {
        self.logic = logic;
        self.compiled.invalidate();
    }

    pub fn data(&self) -> &ListField {
        &self.data
    }

    pub fn set_data(&mut self, data: Option<String>) {
        self.data.set(data);
    }

    pub fn code(&self) -> &LegacyCode {
        &self.code
    }

    pub fn set_code(&mut self, code: Option<String>) {
        self.code.set(code);
    }

    pub fn mode(&self) -> EvaluationMode {
        EvaluationMode::select(self.rules_json.as_deref(), &self.code)
    }

    /// 编译后的规则集，同一实例只解析一次
    pub fn compiled_rules(&self) -> Arc<Result<CompiledRuleSet>> {
        self.compiled.get_or_compute(|| {
            RuleCompiler::compile_from_json(
                self.rules_json.as_deref().unwrap_or_default(),
                self.logic.as_deref(),
            )
        })
    }

    /// 记录是否命中该过滤器，从不返回错误
    pub fn matches(&self, record: &dyn Record) -> bool {
        self.evaluate(record, &RuleExecutor::new()).matched
    }

    pub fn evaluate(&self, record: &dyn Record, executor: &RuleExecutor) -> EvaluationResult {
        self.evaluate_at(record, executor, Utc::now())
    }

    /// 以指定时间作为 `less_than_days_ago` 的参照评估
    pub fn evaluate_at(
        &self,
        record: &dyn Record,
        executor: &RuleExecutor,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let mode = self.mode();

        let result = match mode {
            EvaluationMode::Structured => match self.compiled_rules().as_ref() {
                Ok(rule_set) => {
                    executor.execute_at(rule_set, record, &self.data.entries(), &self.id, now)
                }
                Err(e) => {
                    error!(
                        config_id = %self.id,
                        reason = %e,
                        "Rule document is malformed, record not matched"
                    );
                    metrics::record_malformed_document("filter");
                    EvaluationResult::new(&self.id, record.record_id(), mode)
                }
            },
            EvaluationMode::Legacy => {
                let mut result = EvaluationResult::new(&self.id, record.record_id(), mode);
                result.matched = self
                    .code
                    .evaluate_filter(record, &self.data.entries(), &self.id);
                result
            }
            EvaluationMode::Empty => EvaluationResult::new(&self.id, record.record_id(), mode),
        };

        metrics::record_evaluation("filter", mode.as_str(), result.matched);
        result
    }

    /// 值是否在白名单中（精确匹配）
    pub fn whitelisted(&self, value: &str) -> bool {
        self.whitelist.contains(value)
    }

    /// 值是否在黑名单中（精确匹配）
    pub fn blacklisted(&self, value: &str) -> bool {
        self.blacklist.contains(value)
    }

    /// 保存前校验，失败时返回全部错误
    pub fn check(&self) -> Result<()> {
        let mut errors = attribute_errors(self.validate());
        errors.extend(self.document_errors());
        into_result(errors)
    }

    fn document_errors(&self) -> Vec<String> {
        let mut errors = validate_rule_document(self.rules_json.as_deref());
        if let Some(logic) = self.logic.as_deref().filter(|l| !l.trim().is_empty()) {
            errors.extend(validate_logic(logic));
        }
        errors
    }
}

fn validate_filter_documents(filter: &MatchFilter) -> std::result::Result<(), ValidationError> {
    document_validation("rules_json", filter.document_errors())
}

/// 报表转换模板
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_template_documents"))]
pub struct ReportTemplate {
    #[serde(default = "new_id")]
    pub id: String,
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[serde(default)]
    transform_json: Option<String>,
    #[serde(default)]
    proc_code: LegacyCode,
    /// 仅供下游写出器使用
    #[serde(default)]
    #[validate(range(min = 1, max = 1000, message = "column_width must be between 1 and 1000"))]
    pub column_width: Option<u32>,
    #[serde(skip)]
    compiled: Memo<Result<CompiledPipeline>>,
}

impl ReportTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            transform_json: None,
            proc_code: LegacyCode::default(),
            column_width: None,
            compiled: Memo::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_transform(mut self, transform_json: impl Into<String>) -> Self {
        self.set_transform_json(Some(transform_json.into()));
        self
    }

    pub fn with_proc_code(mut self, proc_code: impl Into<String>) -> Self {
        self.proc_code.set(Some(proc_code.into()));
        self
    }

    pub fn transform_json(&self) -> Option<&str> {
        self.transform_json.as_deref()
    }

    pub fn set_transform_json(&mut self, transform_json: Option<String>) {
        self.transform_json = transform_json;
        self.compiled.invalidate();
    }

    pub fn proc_code(&self) -> &LegacyCode {
        &self.proc_code
    }

    pub fn set_proc_code(&mut self, proc_code: Option<String>) {
        self.proc_code.set(proc_code);
    }

    pub fn mode(&self) -> EvaluationMode {
        EvaluationMode::select(self.transform_json.as_deref(), &self.proc_code)
    }

    /// 编译后的管道，同一实例只解析一次
    pub fn compiled_pipeline(&self) -> Arc<Result<CompiledPipeline>> {
        self.compiled.get_or_compute(|| {
            PipelineCompiler::compile_from_json(
                self.transform_json.as_deref().unwrap_or_default(),
                &self.id,
            )
        })
    }

    /// 构建报表行，从不返回错误
    pub fn build_row(&self, record: &dyn Record) -> Row {
        let mode = self.mode();

        let row = match mode {
            EvaluationMode::Structured => match self.compiled_pipeline().as_ref() {
                Ok(pipeline) => RowBuilder::build(pipeline, record, &self.id),
                Err(e) => {
                    error!(
                        config_id = %self.id,
                        reason = %e,
                        "Transform document is malformed, emitting error row"
                    );
                    metrics::record_malformed_document("report");
                    error_row()
                }
            },
            EvaluationMode::Legacy => self.proc_code.build_row(record, &self.id),
            EvaluationMode::Empty => Row::new(),
        };

        metrics::record_evaluation("report", mode.as_str(), !is_error_row(&row));
        row
    }

    /// 列标签；旧版表达式只有在拿到记录后才知道列，返回空
    pub fn header(&self) -> Vec<String> {
        match self.mode() {
            EvaluationMode::Structured => match self.compiled_pipeline().as_ref() {
                Ok(pipeline) => pipeline.header(),
                Err(_) => vec![ERROR_CELL.to_string()],
            },
            EvaluationMode::Legacy | EvaluationMode::Empty => Vec::new(),
        }
    }

    /// 保存前校验，失败时返回全部错误
    pub fn check(&self) -> Result<()> {
        let mut errors = attribute_errors(self.validate());
        errors.extend(self.document_errors());
        into_result(errors)
    }

    fn document_errors(&self) -> Vec<String> {
        validate_transform_document(self.transform_json.as_deref())
    }
}

fn validate_template_documents(
    template: &ReportTemplate,
) -> std::result::Result<(), ValidationError> {
    document_validation("transform_json", template.document_errors())
}

/// 批量导入的配置集合
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationBundle {
    #[serde(default)]
    pub filters: Vec<MatchFilter>,
    #[serde(default)]
    pub templates: Vec<ReportTemplate>,
}

fn document_validation(
    code: &'static str,
    errors: Vec<String>,
) -> std::result::Result<(), ValidationError> {
    if errors.is_empty() {
        return Ok(());
    }
    let mut error = ValidationError::new(code);
    error.message = Some(errors.join("; ").into());
    Err(error)
}

/// 属性级错误（文档级错误由 `document_errors` 单独逐条给出）
fn attribute_errors(outcome: std::result::Result<(), ValidationErrors>) -> Vec<String> {
    let Err(errors) = outcome else {
        return Vec::new();
    };

    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .filter(|(field, _)| *field != "__all__")
        .flat_map(|(field, errs)| {
            errs.iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("{} is invalid ({})", field, e.code),
                })
                .collect::<Vec<_>>()
        })
        .collect();
    messages.sort();
    messages
}

fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(RuleError::ConfigurationInvalid(errors))
    }
}
