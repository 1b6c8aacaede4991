//! 分组服务 - 业务能力层
//!
//! 提供分组、分组审核、重新分组三种能力，不关心循环与流程

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::infrastructure::gateway::{GatewayRequest, GenerationGateway, StageKind};
use crate::models::document::DocumentSet;
use crate::models::group::{Group, GroupSet};
use crate::models::review::{ReviewVerdict, VerdictStatus};
use crate::services::brief::QueryBrief;
use crate::services::parse::{de_ids, parse_response, parse_status};

const PREVIEW_CHARS: usize = 300;

/// 文档数不超过该值时本地直接分成一组
pub const LOCAL_GROUPING_LIMIT: usize = 2;

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    theme: Option<String>,
    #[serde(deserialize_with = "de_ids")]
    doc_ids: Vec<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupReviewResponse {
    status: String,
    #[serde(default)]
    issues: Vec<String>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    justified_single_groups: Vec<String>,
    #[serde(default)]
    group_confidence: HashMap<String, f64>,
}

/// 分组审核结果
#[derive(Debug, Clone)]
pub struct GroupReview {
    pub verdict: ReviewVerdict,
    /// 分组名 → 置信度（0~1）
    pub confidence: HashMap<String, f64>,
}

pub struct GroupingService {
    gateway: Arc<dyn GenerationGateway>,
    min_group_size: usize,
    max_group_size: usize,
}

impl GroupingService {
    pub fn new(gateway: Arc<dyn GenerationGateway>, min_group_size: usize, max_group_size: usize) -> Self {
        Self {
            gateway,
            min_group_size,
            max_group_size,
        }
    }

    fn constraints(&self) -> String {
        format!(
            "Each group must have between {} and {} documents. \
             Single-document groups are allowed only with a clear reason.",
            self.min_group_size, self.max_group_size
        )
    }

    /// 初始分组（generation 0）
    ///
    /// 返回的快照已通过覆盖校验
    pub async fn group(&self, documents: &DocumentSet, brief: &QueryBrief) -> AppResult<GroupSet> {
        let expected = documents.ids();
        if documents.len() <= LOCAL_GROUPING_LIMIT {
            debug!("文档数 {} 不足以分组，本地归为一组", documents.len());
            let groups = if documents.is_empty() {
                Vec::new()
            } else {
                vec![Group::new(
                    "All documents",
                    brief.query.clone(),
                    expected.clone(),
                    "文档数量过少，直接归为一组",
                )]
            };
            return GroupSet::new(StageKind::Grouping.as_str(), 0, groups, &expected);
        }

        let task = format!(
            "{}\n\nGroup the documents by topic and year.\n{}",
            brief.describe(),
            self.constraints()
        );
        let payload = documents.iter().map(|d| d.to_payload(PREVIEW_CHARS)).collect();
        let request = GatewayRequest::new(StageKind::Grouping, task, payload);

        let value = self.gateway.generate(&request).await?;
        let groups = build_groups(StageKind::Grouping.as_str(), value)?;
        let set = GroupSet::new(StageKind::Grouping.as_str(), 0, groups, &expected)?;
        info!("✓ 初始分组完成: {} 个分组", set.len());
        Ok(set)
    }

    /// 审核分组
    pub async fn review(
        &self,
        groups: &GroupSet,
        documents: &DocumentSet,
        brief: &QueryBrief,
    ) -> AppResult<GroupReview> {
        let stage = StageKind::GroupReview.as_str();
        let task = format!(
            "{}\n\nReview the current groups (generation {}).\n{}\n\nCURRENT GROUPS:\n{}",
            brief.describe(),
            groups.generation,
            self.constraints(),
            describe_groups(groups, documents)
        );
        let payload = documents.iter().map(|d| d.to_payload(120)).collect();
        let request = GatewayRequest::new(StageKind::GroupReview, task, payload);

        let response: GroupReviewResponse =
            parse_response(stage, self.gateway.generate(&request).await?)?;

        let names: HashSet<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        let status = parse_status(stage, &response.status)?;
        let mut verdict = match status {
            VerdictStatus::Accepted => ReviewVerdict::accepted(response.feedback),
            VerdictStatus::Rejected => ReviewVerdict::rejected(response.feedback, Vec::new()),
        };
        verdict.issues = response.issues;
        verdict.justified_groups = response
            .justified_single_groups
            .into_iter()
            .filter(|n| names.contains(n.as_str()))
            .collect();

        let confidence = response
            .group_confidence
            .into_iter()
            .filter(|(name, _)| names.contains(name.as_str()))
            .map(|(name, c)| (name, c.clamp(0.0, 1.0)))
            .collect();

        Ok(GroupReview { verdict, confidence })
    }

    /// 根据反馈重新分组，产生下一代快照
    ///
    /// 输出无法解析时返回格式错误；能解析但破坏覆盖时返回覆盖错误
    pub async fn regroup(
        &self,
        groups: &GroupSet,
        documents: &DocumentSet,
        brief: &QueryBrief,
        feedback: &str,
    ) -> AppResult<GroupSet> {
        let stage = StageKind::Regroup.as_str();
        let task = format!(
            "{}\n\nRebuild the groups using the reviewer feedback.\n{}\n\n\
             CURRENT GROUPS:\n{}\n\nREVIEWER FEEDBACK:\n{}",
            brief.describe(),
            self.constraints(),
            describe_groups(groups, documents),
            feedback
        );
        let payload = documents.iter().map(|d| d.to_payload(PREVIEW_CHARS)).collect();
        let request = GatewayRequest::new(StageKind::Regroup, task, payload);

        let value = self.gateway.generate(&request).await?;
        let new_groups = build_groups(stage, value)?;
        GroupSet::new(stage, groups.generation + 1, new_groups, &documents.ids())
    }
}

/// 把响应转换为分组列表；分组名去空、去重
///
/// 成员是否守恒留给 `GroupSet::new` 校验
fn build_groups(stage: &str, value: serde_json::Value) -> AppResult<Vec<Group>> {
    let response: GroupsResponse = parse_response(stage, value)?;
    let mut used: HashSet<String> = HashSet::new();
    let mut groups = Vec::with_capacity(response.groups.len());

    for (idx, raw) in response.groups.into_iter().enumerate() {
        let base = raw
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Group {}", idx + 1));
        let mut name = base.clone();
        let mut n = 2;
        while !used.insert(name.clone()) {
            name = format!("{} ({})", base, n);
            n += 1;
        }

        groups.push(Group::new(
            name,
            raw.theme.unwrap_or_default(),
            raw.doc_ids,
            raw.reasoning.unwrap_or_default(),
        ));
    }
    Ok(groups)
}

fn describe_groups(groups: &GroupSet, documents: &DocumentSet) -> String {
    groups
        .iter()
        .map(|g| {
            let titles: Vec<String> = g
                .member_ids
                .iter()
                .map(|id| {
                    let title = documents.get(id).map(|d| d.title()).unwrap_or("");
                    format!("  - {} | {}", id, title)
                })
                .collect();
            format!(
                "Group '{}' ({} docs) theme: {}\n{}",
                g.name,
                g.len(),
                g.theme,
                titles.join("\n")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
