//! 配置存储管理
//!
//! 使用 DashMap 提供线程安全的配置缓存。配置以 `Arc` 共享，
//! 各自的编译缓存随实例存在，替换配置即丢弃旧缓存。

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::{Result, RuleError};
use crate::executor::RuleExecutor;
use crate::models::{
    ConfigurationBundle, EvaluationMode, EvaluationResult, MatchFilter, ReportTemplate,
};
use crate::pipeline::Row;
use crate::record::Record;

/// 配置存储
#[derive(Clone, Default)]
pub struct ConfigurationStore {
    filters: Arc<DashMap<String, Arc<MatchFilter>>>,
    templates: Arc<DashMap<String, Arc<ReportTemplate>>>,
}

impl ConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 过滤器数量
    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// 模板数量
    pub fn template_count(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.templates.is_empty()
    }

    /// 校验并加载过滤器，同 ID 的旧配置被替换
    #[instrument(skip(self, filter), fields(config_id = %filter.id, name = %filter.name))]
    pub fn load_filter(&self, filter: MatchFilter) -> Result<()> {
        filter.check()?;

        let id = filter.id.clone();
        self.filters.insert(id.clone(), Arc::new(filter));

        info!("过滤器已加载: {}", id);
        Ok(())
    }

    /// 校验并加载模板，同 ID 的旧配置被替换
    #[instrument(skip(self, template), fields(config_id = %template.id, name = %template.name))]
    pub fn load_template(&self, template: ReportTemplate) -> Result<()> {
        template.check()?;

        let id = template.id.clone();
        self.templates.insert(id.clone(), Arc::new(template));

        info!("模板已加载: {}", id);
        Ok(())
    }

    /// 批量加载，无效配置跳过并返回其错误
    #[instrument(skip(self, bundle))]
    pub fn load_bundle(&self, bundle: ConfigurationBundle) -> Vec<(String, RuleError)> {
        let mut errors = Vec::new();
        let mut loaded = 0;

        for filter in bundle.filters {
            let id = filter.id.clone();
            match self.load_filter(filter) {
                Ok(()) => loaded += 1,
                Err(e) => errors.push((id, e)),
            }
        }

        for template in bundle.templates {
            let id = template.id.clone();
            match self.load_template(template) {
                Ok(()) => loaded += 1,
                Err(e) => errors.push((id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {} 个配置无效", errors.len());
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded, errors.len());
        errors
    }

    pub fn filter(&self, id: &str) -> Option<Arc<MatchFilter>> {
        self.filters.get(id).map(|f| Arc::clone(f.value()))
    }

    pub fn template(&self, id: &str) -> Option<Arc<ReportTemplate>> {
        self.templates.get(id).map(|t| Arc::clone(t.value()))
    }

    /// 删除过滤器
    #[instrument(skip(self))]
    pub fn remove_filter(&self, id: &str) -> Result<()> {
        if self.filters.remove(id).is_some() {
            info!("过滤器已删除: {}", id);
            Ok(())
        } else {
            warn!("删除不存在的过滤器: {}", id);
            Err(RuleError::ConfigurationNotFound(id.to_string()))
        }
    }

    /// 删除模板
    #[instrument(skip(self))]
    pub fn remove_template(&self, id: &str) -> Result<()> {
        if self.templates.remove(id).is_some() {
            info!("模板已删除: {}", id);
            Ok(())
        } else {
            warn!("删除不存在的模板: {}", id);
            Err(RuleError::ConfigurationNotFound(id.to_string()))
        }
    }

    /// 所有过滤器 ID（已排序）
    pub fn filter_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.filters.iter().map(|f| f.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 所有模板 ID（已排序）
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        ids
    }

    /// 用所有过滤器评估记录，按过滤器 ID 排序返回结果
    pub fn screen(&self, record: &dyn Record, executor: &RuleExecutor) -> Vec<EvaluationResult> {
        let mut filters: Vec<Arc<MatchFilter>> =
            self.filters.iter().map(|f| Arc::clone(f.value())).collect();
        filters.sort_by(|a, b| a.id.cmp(&b.id));

        filters
            .iter()
            .map(|filter| filter.evaluate(record, executor))
            .collect()
    }

    /// 用指定模板构建报表行
    pub fn build_row(&self, template_id: &str, record: &dyn Record) -> Result<Row> {
        let template = self
            .template(template_id)
            .ok_or_else(|| RuleError::ConfigurationNotFound(template_id.to_string()))?;
        Ok(template.build_row(record))
    }

    /// 清空所有配置
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.filters.len() + self.templates.len();
        self.filters.clear();
        self.templates.clear();
        info!("已清空 {} 个配置", count);
    }

    /// 存储统计信息
    pub fn stats(&self) -> ConfigurationStoreStats {
        let mut stats = ConfigurationStoreStats {
            filters_count: self.filters.len(),
            templates_count: self.templates.len(),
            ..Default::default()
        };

        for filter in self.filters.iter() {
            match filter.mode() {
                EvaluationMode::Structured => stats.structured_count += 1,
                EvaluationMode::Legacy => stats.legacy_count += 1,
                EvaluationMode::Empty => {}
            }
        }
        for template in self.templates.iter() {
            match template.mode() {
                EvaluationMode::Structured => stats.structured_count += 1,
                EvaluationMode::Legacy => stats.legacy_count += 1,
                EvaluationMode::Empty => {}
            }
        }

        stats
    }
}

/// 配置存储统计信息
#[derive(Debug, Clone, Default)]
pub struct ConfigurationStoreStats {
    pub filters_count: usize,
    pub templates_count: usize,
    /// 使用结构化文档的配置数
    pub structured_count: usize,
    /// 仍在使用旧版表达式的配置数
    pub legacy_count: usize,
}
