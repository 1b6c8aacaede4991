pub mod task_loader;

pub use task_loader::{load_task_by_id, load_tasks_file};
