//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集。
//! 未安装 recorder 时所有记录函数都是空操作，引擎在测试中无需任何初始化。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub const EVALUATIONS_TOTAL: &str = "rule_engine_evaluations_total";
pub const CONDITION_FAILURES_TOTAL: &str = "rule_engine_condition_failures_total";
pub const EXTRACTION_FAILURES_TOTAL: &str = "rule_engine_extraction_failures_total";
pub const MALFORMED_DOCUMENTS_TOTAL: &str = "rule_engine_malformed_documents_total";
pub const LEGACY_INVOCATIONS_TOTAL: &str = "rule_engine_legacy_invocations_total";
pub const LEGACY_FAILURES_TOTAL: &str = "rule_engine_legacy_failures_total";

/// Metrics 句柄
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    /// 渲染 Prometheus 文本格式快照
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// 安装全局 Prometheus recorder
pub fn init(service_name: &str) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_common_metrics(service_name);

    Ok(MetricsHandle { handle })
}

/// 注册指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!(EVALUATIONS_TOTAL, "Total number of configuration evaluations");
    metrics::describe_counter!(
        CONDITION_FAILURES_TOTAL,
        "Conditions degraded to false because of an internal failure"
    );
    metrics::describe_counter!(
        EXTRACTION_FAILURES_TOTAL,
        "Field or association reads that failed and were treated as absent"
    );
    metrics::describe_counter!(
        MALFORMED_DOCUMENTS_TOTAL,
        "Documents that failed to parse at evaluation time"
    );
    metrics::describe_counter!(
        LEGACY_INVOCATIONS_TOTAL,
        "Invocations of the deprecated free-text expression path"
    );
    metrics::describe_counter!(
        LEGACY_FAILURES_TOTAL,
        "Legacy expressions that failed and fell back to safe defaults"
    );

    // 记录服务启动
    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次评估（kind: filter / report，mode: structured / legacy / empty）
#[inline]
pub fn record_evaluation(kind: &'static str, mode: &'static str, matched: bool) {
    metrics::counter!(
        EVALUATIONS_TOTAL,
        "kind" => kind,
        "mode" => mode,
        "matched" => matched.to_string()
    )
    .increment(1);
}

/// 记录条件失败
#[inline]
pub fn record_condition_failure(reason: &'static str) {
    metrics::counter!(CONDITION_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// 记录字段读取失败
#[inline]
pub fn record_extraction_failure(kind: &'static str) {
    metrics::counter!(EXTRACTION_FAILURES_TOTAL, "kind" => kind).increment(1);
}

/// 记录格式错误的文档
#[inline]
pub fn record_malformed_document(kind: &'static str) {
    metrics::counter!(MALFORMED_DOCUMENTS_TOTAL, "kind" => kind).increment(1);
}

/// 记录旧版表达式调用
#[inline]
pub fn record_legacy_invocation(kind: &'static str) {
    metrics::counter!(LEGACY_INVOCATIONS_TOTAL, "kind" => kind).increment(1);
}

/// 记录旧版表达式失败
#[inline]
pub fn record_legacy_failure(kind: &'static str) {
    metrics::counter!(LEGACY_FAILURES_TOTAL, "kind" => kind).increment(1);
}
