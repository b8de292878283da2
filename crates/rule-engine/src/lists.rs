//! 列表型辅助数据
//!
//! 将换行分隔的文本（`data`、`whitelist`、`blacklist`）解析为去空白的字面量列表，
//! 兼容 LF 与 CRLF。解析结果按实例缓存，重新赋值时失效。

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::cache::Memo;

/// `in_list` 操作符引用配置自带列表时使用的哨兵值
pub const DATA_LIST: &str = "DATA_LIST";

/// 解析换行分隔文本；空文本得到空列表
pub fn parse_list(text: Option<&str>) -> Vec<String> {
    text.map(|t| {
        t.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// 带缓存的列表字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub struct ListField {
    text: Option<String>,
    parsed: Memo<Vec<String>>,
}

impl ListField {
    pub fn new(text: Option<String>) -> Self {
        Self {
            text,
            parsed: Memo::new(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// 重新赋值，同时让缓存失效
    pub fn set(&mut self, text: Option<String>) {
        self.text = text;
        self.parsed.invalidate();
    }

    pub fn entries(&self) -> Arc<Vec<String>> {
        self.parsed.get_or_compute(|| parse_list(self.text.as_deref()))
    }

    /// 精确匹配
    pub fn contains(&self, value: &str) -> bool {
        self.entries().iter().any(|entry| entry == value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl From<Option<String>> for ListField {
    fn from(text: Option<String>) -> Self {
        Self::new(text)
    }
}

impl From<ListField> for Option<String> {
    fn from(field: ListField) -> Self {
        field.text
    }
}
