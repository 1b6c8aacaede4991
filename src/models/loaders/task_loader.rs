use std::path::Path;
use tokio::fs;

use crate::error::{AppError, AppResult};
use crate::models::task::RawTask;

/// 读取任务文件（JSON 数组）
pub async fn load_tasks_file(path: &Path) -> AppResult<Vec<RawTask>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::io(path.display().to_string(), e))?;
    let tasks: Vec<RawTask> = serde_json::from_str(&content)?;
    tracing::debug!("从 {} 读取到 {} 个任务", path.display(), tasks.len());
    Ok(tasks)
}

/// 在任务文件中按标识符查找任务
pub async fn load_task_by_id(path: &Path, task_id: u64) -> AppResult<RawTask> {
    load_tasks_file(path)
        .await?
        .into_iter()
        .find(|t| t.id == task_id)
        .ok_or_else(|| AppError::Source {
            task_id: task_id.to_string(),
            message: format!("{} 中没有该任务", path.display()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_task_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input_data.json");
        std::fs::write(
            &path,
            r#"[{"id": 1, "data": {"text": "a", "items": []}},
                {"id": 2, "data": {"text": "b", "items": []}}]"#,
        )
        .unwrap();

        let task = load_task_by_id(&path, 2).await.unwrap();
        assert_eq!(task.data.text, "b");

        let err = load_task_by_id(&path, 3).await.unwrap_err();
        assert!(matches!(err, AppError::Source { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = load_tasks_file(Path::new("/nonexistent/input.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Io { .. }));
    }
}
