//! 旧版自由文本表达式
//!
//! 仅在配置没有结构化文档时使用。表达式以 Rhai 脚本编写，脚本作用域中可见：
//! - `record`：记录上所有白名单字段，以及每个白名单关联的字段表
//! - `data`：过滤器的辅助列表（仅过滤器）
//!
//! 过滤器脚本返回 bool，报表脚本返回 `[label, value]` 数组。
//! 每次调用都会输出弃用警告，任何失败都降级为不匹配或哨兵行。

use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde::{Deserialize, Serialize};
use screening_shared::observability::metrics;
use std::sync::{Arc, LazyLock};
use tracing::{error, warn};

use crate::allowlist::{ALLOWED_ASSOCIATIONS, ALLOWED_FIELDS};
use crate::cache::Memo;
use crate::error::{Result, RuleError};
use crate::pipeline::{error_row, Row};
use crate::record::{association_guarded, read_guarded, FieldValue, Record};

const MAX_OPERATIONS: u64 = 100_000;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FUNCTION_EXPR_DEPTH: usize = 32;
const MAX_COLLECTION_SIZE: usize = 10_000;

static ENGINE: LazyLock<Engine> = LazyLock::new(|| {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FUNCTION_EXPR_DEPTH);
    engine.set_max_string_size(MAX_COLLECTION_SIZE);
    engine.set_max_array_size(MAX_COLLECTION_SIZE);
    engine.set_max_map_size(MAX_COLLECTION_SIZE);
    engine
});

/// 带编译缓存的旧版表达式字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub struct LegacyCode {
    source: Option<String>,
    compiled: Memo<std::result::Result<AST, String>>,
}

impl LegacyCode {
    pub fn new(source: Option<String>) -> Self {
        Self {
            source,
            compiled: Memo::new(),
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// 重新赋值，同时让编译缓存失效
    pub fn set(&mut self, source: Option<String>) {
        self.source = source;
        self.compiled.invalidate();
    }

    /// 是否有非空白的表达式
    pub fn is_present(&self) -> bool {
        self.source.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// 以过滤器语义执行，失败时返回 false
    pub fn evaluate_filter(&self, record: &dyn Record, list: &[String], config_id: &str) -> bool {
        deprecation_warning("filter", config_id);

        let mut scope = Scope::new();
        scope.push("record", record_map(record));
        scope.push(
            "data",
            list.iter().cloned().map(Dynamic::from).collect::<Array>(),
        );

        let outcome = self.run(&mut scope).and_then(|value| {
            value.as_bool().map_err(|type_name| {
                RuleError::LegacyEvaluationFailure(format!(
                    "filter expression returned {} instead of bool",
                    type_name
                ))
            })
        });

        match outcome {
            Ok(matched) => matched,
            Err(e) => {
                failure(&e, "filter", config_id, record);
                false
            }
        }
    }

    /// 以报表语义执行，失败时返回哨兵行
    pub fn build_row(&self, record: &dyn Record, config_id: &str) -> Row {
        deprecation_warning("report", config_id);

        let mut scope = Scope::new();
        scope.push("record", record_map(record));

        match self.run(&mut scope).and_then(into_row) {
            Ok(row) => row,
            Err(e) => {
                failure(&e, "report", config_id, record);
                error_row()
            }
        }
    }

    fn compiled(&self) -> Arc<std::result::Result<AST, String>> {
        self.compiled.get_or_compute(|| {
            ENGINE
                .compile(self.source.as_deref().unwrap_or_default())
                .map_err(|e| e.to_string())
        })
    }

    fn run(&self, scope: &mut Scope) -> Result<Dynamic> {
        let compiled = self.compiled();
        let ast = compiled
            .as_ref()
            .as_ref()
            .map_err(|e| RuleError::LegacyEvaluationFailure(format!("compile error: {}", e)))?;

        ENGINE
            .eval_ast_with_scope::<Dynamic>(scope, ast)
            .map_err(|e| RuleError::LegacyEvaluationFailure(e.to_string()))
    }
}

impl From<Option<String>> for LegacyCode {
    fn from(source: Option<String>) -> Self {
        Self::new(source)
    }
}

impl From<LegacyCode> for Option<String> {
    fn from(code: LegacyCode) -> Self {
        code.source
    }
}

fn deprecation_warning(kind: &'static str, config_id: &str) {
    warn!(
        config_id = %config_id,
        kind = kind,
        "Deprecated free-text expression evaluated, migrate to a structured document"
    );
    metrics::record_legacy_invocation(kind);
}

fn failure(error: &RuleError, kind: &'static str, config_id: &str, record: &dyn Record) {
    error!(
        config_id = %config_id,
        record_id = %record.record_id(),
        reason = %error,
        "Legacy expression failed, using safe default"
    );
    metrics::record_legacy_failure(kind);
}

/// 脚本返回值转报表行
fn into_row(value: Dynamic) -> Result<Row> {
    let invalid = |what: &str| {
        RuleError::LegacyEvaluationFailure(format!("report expression returned {}", what))
    };

    value
        .into_array()
        .map_err(|type_name| invalid(type_name))?
        .into_iter()
        .map(|pair| {
            let pair = pair.into_array().map_err(|type_name| invalid(type_name))?;
            match pair.as_slice() {
                [label, value] => Ok((display(label), display(value))),
                _ => Err(invalid("a pair without exactly two elements")),
            }
        })
        .collect()
}

fn display(value: &Dynamic) -> String {
    if value.is_unit() {
        String::new()
    } else {
        value.to_string()
    }
}

/// 记录的脚本视图：只暴露白名单字段和白名单关联
fn record_map(record: &dyn Record) -> Map {
    let mut map = fields_map(record);

    for association in ALLOWED_ASSOCIATIONS {
        match association_guarded(record, association) {
            Ok(Some(associated)) => {
                map.insert((*association).into(), Dynamic::from_map(fields_map(associated)));
            }
            Ok(None) => {
                map.insert((*association).into(), Dynamic::UNIT);
            }
            Err(_) => {}
        }
    }

    map
}

fn fields_map(record: &dyn Record) -> Map {
    let mut map = Map::new();
    for field in ALLOWED_FIELDS {
        if let Ok(value) = read_guarded(record, field) {
            map.insert((*field).into(), to_dynamic(value));
        }
    }
    map
}

fn to_dynamic(value: FieldValue) -> Dynamic {
    match value {
        FieldValue::Null => Dynamic::UNIT,
        FieldValue::Bool(b) => Dynamic::from(b),
        FieldValue::Int(i) => Dynamic::from(i),
        FieldValue::Float(f) => Dynamic::from(f),
        FieldValue::Text(s) => Dynamic::from(s),
        other @ (FieldValue::Time(_) | FieldValue::Date(_)) => Dynamic::from(other.to_string()),
    }
}
