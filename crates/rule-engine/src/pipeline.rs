//! 报表行转换管道
//!
//! 按列构建报表行：读取来源字段（最多经过一跳关联），依次应用转换，最后至多应用一个格式。
//! 读取失败只影响当前列，整份文档解析失败时返回哨兵行。

use serde::{Deserialize, Serialize};
use screening_shared::observability::metrics;
use tracing::{error, warn};

use crate::allowlist::allow_list;
use crate::error::{Result, RuleError};
use crate::record::{association_guarded, read_guarded, FieldValue, Record};
use crate::transforms::{Format, Transformation};

/// 报表行：(列标签, 单元格文本)
pub type Row = Vec<(String, String)>;

/// 哨兵行的标签与单元格
pub const ERROR_CELL: &str = "ERROR";

/// 文档无法解析时返回的哨兵行
pub fn error_row() -> Row {
    vec![(ERROR_CELL.to_string(), ERROR_CELL.to_string())]
}

pub fn is_error_row(row: &Row) -> bool {
    row.len() == 1 && row[0].0 == ERROR_CELL && row[0].1 == ERROR_CELL
}

/// 转换文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformDocument {
    pub columns: Vec<ColumnSpec>,
}

/// 列定义
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnSpec {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub transformations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// 来源路径：字段本身，或经过一跳关联的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePath {
    Field(String),
    Associated { association: String, field: String },
}

impl SourcePath {
    /// 解析点号路径，超过两段或不在白名单内的路径直接拒绝
    pub fn parse(source: &str) -> std::result::Result<Self, String> {
        let segments: Vec<&str> = source.split('.').collect();

        if segments.iter().any(|s| s.is_empty()) {
            return Err(format!("source '{}' has an empty segment", source));
        }

        match segments.as_slice() {
            [field] => {
                check_field(field)?;
                Ok(Self::Field(field.to_string()))
            }
            [association, field] => {
                if !allow_list().is_association_allowed(association) {
                    return Err(format!("association '{}' not allowed", association));
                }
                check_field(field)?;
                Ok(Self::Associated {
                    association: association.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Err(format!("source '{}' has more than two segments", source)),
        }
    }
}

fn check_field(field: &str) -> std::result::Result<(), String> {
    if allow_list().is_field_allowed(field) {
        Ok(())
    } else {
        Err(format!("field '{}' not allowed", field))
    }
}

/// 编译后的列
#[derive(Debug, Clone)]
pub struct CompiledColumn {
    pub label: String,
    pub source: std::result::Result<SourcePath, String>,
    pub transformations: Vec<Transformation>,
    pub format: Option<Format>,
}

/// 编译后的管道
#[derive(Debug, Clone, Default)]
pub struct CompiledPipeline {
    pub columns: Vec<CompiledColumn>,
}

impl CompiledPipeline {
    /// 列标签，按文档顺序
    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.label.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// 管道编译器
pub struct PipelineCompiler;

impl PipelineCompiler {
    /// 从 JSON 编译管道
    ///
    /// 未知的转换或格式名在编译时记录一次警告并跳过。
    pub fn compile_from_json(json: &str, config_id: &str) -> Result<CompiledPipeline> {
        let document: TransformDocument = serde_json::from_str(json)
            .map_err(|e| RuleError::MalformedDocument(e.to_string()))?;
        Ok(Self::compile(&document, config_id))
    }

    pub fn compile(document: &TransformDocument, config_id: &str) -> CompiledPipeline {
        let columns = document
            .columns
            .iter()
            .map(|spec| Self::compile_column(spec, config_id))
            .collect();

        CompiledPipeline { columns }
    }

    fn compile_column(spec: &ColumnSpec, config_id: &str) -> CompiledColumn {
        let label = spec.output.clone().unwrap_or_default();

        let source = match spec.source.as_deref() {
            Some(source) => SourcePath::parse(source),
            None => Err("source is missing".to_string()),
        };

        let transformations = spec
            .transformations
            .iter()
            .flatten()
            .filter_map(|name| {
                let found = allow_list().transformation(name);
                if found.is_none() {
                    warn!(
                        config_id = %config_id,
                        column = %label,
                        transformation = %name,
                        "Unknown transformation skipped"
                    );
                }
                found
            })
            .collect();

        let format = spec.format.as_deref().and_then(|name| {
            let found = allow_list().format(name);
            if found.is_none() {
                warn!(
                    config_id = %config_id,
                    column = %label,
                    format = %name,
                    "Unknown format skipped"
                );
            }
            found
        });

        CompiledColumn {
            label,
            source,
            transformations,
            format,
        }
    }
}

/// 报表行构建器
pub struct RowBuilder;

impl RowBuilder {
    /// 逐列构建报表行，列之间互不影响
    pub fn build(pipeline: &CompiledPipeline, record: &dyn Record, config_id: &str) -> Row {
        pipeline
            .columns
            .iter()
            .map(|column| (column.label.clone(), Self::render(column, record, config_id)))
            .collect()
    }

    fn render(column: &CompiledColumn, record: &dyn Record, config_id: &str) -> String {
        let value = match Self::extract(column, record) {
            Ok(value) => value,
            Err(reason) => {
                error!(
                    config_id = %config_id,
                    record_id = %record.record_id(),
                    column = %column.label,
                    reason = %reason,
                    "Column extraction failed, rendered empty"
                );
                metrics::record_extraction_failure("report");
                return String::new();
            }
        };

        let value = column
            .transformations
            .iter()
            .fold(value, |acc, t| t.apply(acc));

        match column.format {
            Some(format) => format.apply(value).to_string(),
            None => value.to_string(),
        }
    }

    fn extract(column: &CompiledColumn, record: &dyn Record) -> std::result::Result<FieldValue, String> {
        match &column.source {
            Ok(SourcePath::Field(field)) => read_guarded(record, field).map_err(|e| e.to_string()),
            Ok(SourcePath::Associated { association, field }) => {
                match association_guarded(record, association).map_err(|e| e.to_string())? {
                    Some(associated) => {
                        read_guarded(associated, field).map_err(|e| e.to_string())
                    }
                    None => Err(format!("association '{}' is empty", association)),
                }
            }
            Err(reason) => Err(reason.clone()),
        }
    }
}
