//! 分组与分组快照

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{AppError, AppResult};

/// 分组状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupStatus {
    Pending,
    Accepted,
    Rejected,
}

/// 主题/年份分组
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub theme: String,
    /// 成员文档标识符（有序、唯一）
    pub member_ids: Vec<String>,
    pub status: GroupStatus,
    /// 分组理由（来自分组或重新分组）
    pub reasoning: String,
    /// 分组审核给出的置信度（0~1），用作排名的质量分
    pub quality: Option<f64>,
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        theme: impl Into<String>,
        member_ids: Vec<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            theme: theme.into(),
            member_ids,
            status: GroupStatus::Pending,
            reasoning: reasoning.into(),
            quality: None,
        }
    }

    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    pub fn is_single(&self) -> bool {
        self.member_ids.len() == 1
    }
}

/// 分组快照
///
/// 每次分组/重新分组都整体替换，`generation` 从 0 开始递增
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupSet {
    pub generation: u32,
    pub groups: Vec<Group>,
}

impl GroupSet {
    /// 构建快照，并校验每个预期文档恰好属于一个分组
    pub fn new(
        stage: &str,
        generation: u32,
        groups: Vec<Group>,
        expected_ids: &[String],
    ) -> AppResult<Self> {
        let set = Self { generation, groups };
        set.verify_coverage(stage, expected_ids)?;
        Ok(set)
    }

    /// 覆盖校验：不丢失、不重复、不引入未知文档，且没有空分组
    pub fn verify_coverage(&self, stage: &str, expected_ids: &[String]) -> AppResult<()> {
        let expected: HashSet<&str> = expected_ids.iter().map(|s| s.as_str()).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut duplicated = Vec::new();
        let mut unknown = Vec::new();

        for group in &self.groups {
            if group.is_empty() {
                return Err(AppError::malformed(
                    stage,
                    format!("分组 '{}' 没有成员", group.name),
                ));
            }
            for id in &group.member_ids {
                if !expected.contains(id.as_str()) {
                    unknown.push(id.clone());
                } else if !seen.insert(id.as_str()) {
                    duplicated.push(id.clone());
                }
            }
        }

        let missing: Vec<String> = expected_ids
            .iter()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() && duplicated.is_empty() && unknown.is_empty() {
            Ok(())
        } else {
            Err(AppError::CoverageViolation {
                stage: stage.to_string(),
                missing,
                duplicated,
                unknown,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    /// 文档 → 所属分组名
    pub fn membership(&self) -> HashMap<String, String> {
        self.groups
            .iter()
            .flat_map(|g| g.member_ids.iter().map(move |id| (id.clone(), g.name.clone())))
            .collect()
    }

    /// 文档 → 所属分组的质量分
    pub fn quality_by_doc(&self) -> HashMap<String, f64> {
        self.groups
            .iter()
            .filter_map(|g| g.quality.map(|q| (g, q)))
            .flat_map(|(g, q)| g.member_ids.iter().map(move |id| (id.clone(), q)))
            .collect()
    }
}
