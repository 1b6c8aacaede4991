pub mod document;
pub mod group;
pub mod label;
pub mod loaders;
pub mod report;
pub mod review;
pub mod task;

pub use document::{Document, DocumentSet, LocationMatch};
pub use group::{Group, GroupSet, GroupStatus};
pub use label::{Confidence, Label, LabelDecision, LabelSet};
pub use loaders::{load_task_by_id, load_tasks_file};
pub use report::{
    FilterRemoval, GroupHistoryEntry, LoopTermination, LoopTrace, QuotaDowngrade, Report,
    ReportEntry, RunOutcome, RunStatus,
};
pub use review::{ReviewVerdict, VerdictStatus};
pub use task::{RawTask, ReferenceExample, TaskInput};
