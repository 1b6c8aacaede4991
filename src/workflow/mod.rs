pub mod cancel;
pub mod group_review;
pub mod label_review;
pub mod review_loop;
pub mod run_ctx;

pub use cancel::CancelToken;
pub use group_review::GroupReviewCycle;
pub use label_review::LabelReviewCycle;
pub use review_loop::{LoopResult, ReviewCycle, ReviewLoop};
pub use run_ctx::RunCtx;
