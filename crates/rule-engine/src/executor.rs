//! 规则执行器
//!
//! 逐条件独立求值后再按 AND / OR 合并。单个条件失败只会让该条件为 false，
//! 不会中断同组其他条件的求值。条件按文档顺序求值，保证日志顺序确定。

use chrono::{DateTime, Utc};
use screening_shared::observability::metrics;
use std::time::Instant;
use tracing::{error, warn};

use crate::allowlist::allow_list;
use crate::compiler::{CompiledCondition, CompiledRuleSet};
use crate::evaluator::ConditionEvaluator;
use crate::models::{EvaluationMode, EvaluationResult};
use crate::operators::LogicalOperator;
use crate::record::{read_guarded, FieldValue, Record};

/// 规则执行器
#[derive(Debug, Clone, Default)]
pub struct RuleExecutor {
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self {
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled
    }

    /// 执行规则评估
    pub fn execute(
        &self,
        rule_set: &CompiledRuleSet,
        record: &dyn Record,
        list: &[String],
        config_id: &str,
    ) -> EvaluationResult {
        self.execute_at(rule_set, record, list, config_id, Utc::now())
    }

    /// 以指定时间作为时间类操作符的参照执行评估
    pub fn execute_at(
        &self,
        rule_set: &CompiledRuleSet,
        record: &dyn Record,
        list: &[String],
        config_id: &str,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let start = Instant::now();

        let mut result =
            EvaluationResult::new(config_id, record.record_id(), EvaluationMode::Structured);

        // 没有任何正向条件的过滤器不能匹配所有记录
        if rule_set.is_empty() {
            if self.trace_enabled {
                result
                    .evaluation_trace
                    .push("no conditions => NOT_MATCHED".to_string());
            }
            result.evaluation_time_us = start.elapsed().as_micros() as i64;
            return result;
        }

        let outcomes: Vec<bool> = rule_set
            .conditions
            .iter()
            .map(|cond| self.evaluate_condition(cond, record, list, config_id, now, &mut result))
            .collect();

        result.matched = match rule_set.logic {
            LogicalOperator::And => outcomes.iter().all(|m| *m),
            LogicalOperator::Or => outcomes.iter().any(|m| *m),
        };

        if self.trace_enabled {
            result.evaluation_trace.push(format!(
                "{} of {} conditions => {}",
                rule_set.logic,
                outcomes.len(),
                if result.matched { "MATCHED" } else { "NOT_MATCHED" }
            ));
        }

        result.evaluation_time_us = start.elapsed().as_micros() as i64;
        result
    }

    /// 评估单个条件，任何失败都降级为 false
    fn evaluate_condition(
        &self,
        cond: &CompiledCondition,
        record: &dyn Record,
        list: &[String],
        config_id: &str,
        now: DateTime<Utc>,
        result: &mut EvaluationResult,
    ) -> bool {
        let path = format!("conditions[{}]", cond.index);

        let (operator, operand) = match &cond.compiled {
            Ok((operator, operand)) => (*operator, operand),
            Err(reason) => {
                warn!(
                    config_id = %config_id,
                    condition = cond.index,
                    reason = %reason,
                    "Invalid condition evaluated as false"
                );
                metrics::record_condition_failure("configuration_invalid");
                self.push_trace(result, format!("{}: {} => INVALID", path, reason));
                return false;
            }
        };

        let field_value = extract_field(record, &cond.field, config_id);

        let matched = match ConditionEvaluator::evaluate(&field_value, operator, operand, list, now)
        {
            Ok(matched) => matched,
            Err(e) => {
                warn!(
                    config_id = %config_id,
                    record_id = %record.record_id(),
                    condition = cond.index,
                    reason = %e,
                    "Condition failed, evaluated as false"
                );
                metrics::record_condition_failure(e.kind());
                self.push_trace(result, format!("{}: {} => FAILED", path, e));
                return false;
            }
        };

        self.push_trace(
            result,
            format!(
                "{}: {} {} => {}",
                path,
                cond.field,
                operator,
                if matched { "MATCHED" } else { "NOT_MATCHED" }
            ),
        );

        if matched {
            result
                .matched_conditions
                .push(format!("{}.{} {}", path, cond.field, operator));
        }

        matched
    }

    fn push_trace(&self, result: &mut EvaluationResult, line: String) {
        if self.trace_enabled {
            result.evaluation_trace.push(line);
        }
    }
}

/// 按白名单读取字段，失败按空值处理
pub(crate) fn extract_field(record: &dyn Record, field: &str, config_id: &str) -> FieldValue {
    if !allow_list().is_field_allowed(field) {
        warn!(config_id = %config_id, field = %field, "Field not allowed, treated as absent");
        metrics::record_extraction_failure("filter");
        return FieldValue::Null;
    }

    match read_guarded(record, field) {
        Ok(value) => value,
        Err(e) => {
            error!(
                config_id = %config_id,
                record_id = %record.record_id(),
                field = %field,
                reason = %e,
                "Field extraction failed, treated as absent"
            );
            metrics::record_extraction_failure("filter");
            FieldValue::Null
        }
    }
}
