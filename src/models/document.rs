//! 文档与文档集合
//!
//! 文档加载后不可变；下游只改变它的标签和所属分组，
//! 这两者分别由 `LabelSet` 和 `GroupSet` 快照持有。

use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};

use crate::error::{AppError, AppResult};
use crate::utils::text;

/// 文档与目标位置的匹配程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationMatch {
    /// 文档位置与目标一致
    Exact,
    /// 文档没有具体位置，或者是全局文档，或者没有指定目标位置
    Global,
    /// 主题可能正确，但位置错误
    Mismatch,
}

/// 待标注文档
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    title: String,
    content: String,
    text: String,
    year: Option<i32>,
    location: Option<String>,
}

impl Document {
    /// 创建文档并推导年份和位置标签
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let title = title.into();
        let content = content.into();
        let text = text::strip_html(&content);

        let year = text::latest_year(&format!("{} {}", title, text));
        let location = text::detect_location(&title).or_else(|| text::detect_location(&text));

        Self {
            id: id.into(),
            title,
            content,
            text,
            year,
            location,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// 原始内容（HTML）
    pub fn content(&self) -> &str {
        &self.content
    }

    /// 纯文本内容
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn has_valid_title(&self) -> bool {
        text::is_valid_title(&self.title)
    }

    pub fn has_link(&self) -> bool {
        self.content.contains("href=")
    }

    /// 计算与目标位置（已归一化）的匹配程度
    pub fn location_match(&self, target: Option<&str>) -> LocationMatch {
        let Some(target) = target else {
            return LocationMatch::Global;
        };
        match self.location.as_deref() {
            None | Some("Global") => LocationMatch::Global,
            Some(loc) if loc.eq_ignore_ascii_case(target) => LocationMatch::Exact,
            Some(_) => LocationMatch::Mismatch,
        }
    }

    /// 发给生成网关的精简表示
    pub fn to_payload(&self, preview_chars: usize) -> JsonValue {
        json!({
            "id": self.id,
            "title": self.title,
            "content_preview": text::truncate_text(&self.text, preview_chars),
            "year": self.year,
            "location": self.location,
            "has_valid_title": self.has_valid_title(),
            "has_link": self.has_link(),
        })
    }
}

/// 一次运行中的文档集合，保持输入顺序，标识符唯一
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: Vec<Document>,
    index: HashMap<String, usize>,
}

impl DocumentSet {
    /// 创建文档集合，标识符重复时返回覆盖错误
    pub fn new(documents: Vec<Document>) -> AppResult<Self> {
        let mut index = HashMap::with_capacity(documents.len());
        let mut duplicated = Vec::new();

        for (pos, doc) in documents.iter().enumerate() {
            if index.insert(doc.id.clone(), pos).is_some() {
                duplicated.push(doc.id.clone());
            }
        }

        if !duplicated.is_empty() {
            return Err(AppError::CoverageViolation {
                stage: "load".to_string(),
                missing: vec![],
                duplicated,
                unknown: vec![],
            });
        }

        Ok(Self { documents, index })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn as_slice(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.index.get(id).map(|&pos| &self.documents[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// 输入顺序中的位置，用于稳定的并列裁决
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.id.clone()).collect()
    }

    /// 按标识符列表取出子集，保持本集合中的顺序
    pub fn subset(&self, ids: &HashSet<String>) -> DocumentSet {
        let documents: Vec<Document> = self
            .documents
            .iter()
            .filter(|d| ids.contains(&d.id))
            .cloned()
            .collect();
        // 子集的标识符必然唯一
        let index = documents
            .iter()
            .enumerate()
            .map(|(pos, d)| (d.id.clone(), pos))
            .collect();
        DocumentSet { documents, index }
    }

    /// 最新的已知年份
    pub fn latest_year(&self) -> Option<i32> {
        self.documents.iter().filter_map(|d| d.year).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_derives_year_and_location() {
        let doc = Document::new(
            "d1",
            "India Employee Benefits",
            "<p>Updated for 2025, replaces the 2023 guide.</p>",
        );
        assert_eq!(doc.year(), Some(2025));
        assert_eq!(doc.location(), Some("India"));
        assert_eq!(doc.text(), "Updated for 2025, replaces the 2023 guide.");
    }

    #[test]
    fn test_document_without_year() {
        let doc = Document::new("d1", "Benefits overview", "<p>general info</p>");
        assert_eq!(doc.year(), None);
        assert_eq!(doc.location(), None);
    }

    #[test]
    fn test_location_match() {
        let india = Document::new("a", "India Holidays", "");
        let us = Document::new("b", "US Holidays", "");
        let global = Document::new("c", "Global Holidays", "");

        assert_eq!(india.location_match(Some("India")), LocationMatch::Exact);
        assert_eq!(us.location_match(Some("India")), LocationMatch::Mismatch);
        assert_eq!(global.location_match(Some("India")), LocationMatch::Global);
        assert_eq!(us.location_match(None), LocationMatch::Global);
    }

    #[test]
    fn test_document_set_rejects_duplicate_ids() {
        let docs = vec![Document::new("a", "t", ""), Document::new("a", "t2", "")];
        let err = DocumentSet::new(docs).unwrap_err();
        assert!(matches!(err, AppError::CoverageViolation { duplicated, .. } if duplicated == vec!["a".to_string()]));
    }

    #[test]
    fn test_subset_keeps_input_order() {
        let set = DocumentSet::new(vec![
            Document::new("a", "A", ""),
            Document::new("b", "B", ""),
            Document::new("c", "C", ""),
        ])
        .unwrap();
        let keep: HashSet<String> = ["c".to_string(), "a".to_string()].into_iter().collect();
        let sub = set.subset(&keep);
        assert_eq!(sub.ids(), vec!["a", "c"]);
        assert_eq!(sub.position("c"), Some(1));
    }
}
