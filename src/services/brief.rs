use chrono::Datelike;

use crate::models::document::{Document, DocumentSet, LocationMatch};

/// 一次运行中所有阶段共享的查询信息
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBrief {
    pub query: String,
    /// 归一化后的目标位置
    pub location: Option<String>,
    /// 判断"当年"的参考年份
    pub reference_year: i32,
}

impl QueryBrief {
    pub fn new(query: impl Into<String>, location: Option<String>, reference_year: i32) -> Self {
        Self {
            query: query.into(),
            location,
            reference_year,
        }
    }

    /// 参考年份：配置值 > 文档中最新的年份 > 当前年份
    pub fn resolve_reference_year(configured: Option<i32>, documents: &DocumentSet) -> i32 {
        configured
            .or_else(|| documents.latest_year())
            .unwrap_or_else(|| chrono::Local::now().year())
    }

    pub fn location_match(&self, doc: &Document) -> LocationMatch {
        doc.location_match(self.location.as_deref())
    }

    /// 年份已知且早于参考年份
    pub fn is_older(&self, doc: &Document) -> bool {
        doc.year().is_some_and(|y| y < self.reference_year)
    }

    /// 任务描述的公共开头
    pub fn describe(&self) -> String {
        format!(
            "Query: \"{}\"\nLocation: {}\nCurrent year: {}",
            self.query,
            self.location.as_deref().unwrap_or("Not specified (global)"),
            self.reference_year
        )
    }
}
