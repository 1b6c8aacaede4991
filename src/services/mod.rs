pub mod brief;
pub mod criteria;
pub mod filter_service;
pub mod grouping_service;
pub mod labeling_service;
pub mod parse;
pub mod quota_engine;

pub use brief::QueryBrief;
pub use filter_service::{FilterOutcome, FilterService};
pub use grouping_service::{GroupReview, GroupingService};
pub use labeling_service::LabelingService;
pub use quota_engine::{QuotaEngine, QuotaOutcome};
