use serde::Serialize;

/// 审核结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    Accepted,
    Rejected,
}

/// 审核步骤的输出，由对应的修复步骤消费
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewVerdict {
    pub status: VerdictStatus,
    /// 逐条列出的问题
    pub issues: Vec<String>,
    /// 给修复步骤的整体反馈
    pub feedback: String,
    /// 被明确说明理由的单文档分组（分组审核）
    pub justified_groups: Vec<String>,
    /// 需要重新处理的文档（标签审核）
    pub flagged_doc_ids: Vec<String>,
    /// 网关审核结果无法使用、只采用确定性规则时为 true
    pub rules_only: bool,
}

impl ReviewVerdict {
    pub fn accepted(feedback: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Accepted,
            issues: Vec::new(),
            feedback: feedback.into(),
            justified_groups: Vec::new(),
            flagged_doc_ids: Vec::new(),
            rules_only: false,
        }
    }

    pub fn rejected(feedback: impl Into<String>, issues: Vec<String>) -> Self {
        Self {
            status: VerdictStatus::Rejected,
            issues,
            feedback: feedback.into(),
            justified_groups: Vec::new(),
            flagged_doc_ids: Vec::new(),
            rules_only: false,
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == VerdictStatus::Accepted
    }

    /// 并入确定性规则发现的问题；只要有问题，结论就是 REJECTED
    pub fn merge_rule_issues(mut self, issues: Vec<String>) -> Self {
        if !issues.is_empty() {
            self.status = VerdictStatus::Rejected;
            self.issues.extend(issues);
        }
        self
    }

    /// 把反馈和问题拼成给修复步骤的文本
    pub fn feedback_text(&self) -> String {
        if self.issues.is_empty() {
            return self.feedback.clone();
        }
        let issues: Vec<String> = self.issues.iter().map(|i| format!("- {}", i)).collect();
        format!("{}\nIssues:\n{}", self.feedback, issues.join("\n"))
    }
}
