//! File-backed project state.
//!
//! Everything lives under one project directory:
//!
//! ```text
//! <root>/.aceflow/config.json
//! <root>/.aceflow/current_state.json
//! <root>/.aceflow/runtime_config.json
//! <root>/.aceflow/task_queue.json
//! <root>/.aceflow/collaboration_history.json
//! <root>/aceflow_result/<Stage>.md
//! ```
//!
//! Writes go to a sibling `*.tmp` file that is renamed over the target, so a
//! reader never observes a half-written document.

use aceflow_core::{ProjectState, Stage, TaskQueue};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::trait_::{Result, StorageError};

/// Name of the state directory.
pub const STATE_DIR: &str = ".aceflow";
/// Name of the stage output directory.
pub const RESULT_DIR: &str = "aceflow_result";

/// Reads and writes the files of one project.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    /// Store rooted at `root`. Nothing is touched until the first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Project directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `.aceflow/`
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// `aceflow_result/`
    pub fn result_dir(&self) -> PathBuf {
        self.root.join(RESULT_DIR)
    }

    /// `.aceflow/config.json`
    pub fn config_path(&self) -> PathBuf {
        self.state_dir().join("config.json")
    }

    /// `.aceflow/current_state.json`
    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("current_state.json")
    }

    /// `.aceflow/runtime_config.json`
    pub fn runtime_config_path(&self) -> PathBuf {
        self.state_dir().join("runtime_config.json")
    }

    /// `.aceflow/task_queue.json`
    pub fn task_queue_path(&self) -> PathBuf {
        self.state_dir().join("task_queue.json")
    }

    /// `.aceflow/collaboration_history.json`
    pub fn history_path(&self) -> PathBuf {
        self.state_dir().join("collaboration_history.json")
    }

    /// `aceflow_result/<Display>.md`
    pub fn stage_result_path(&self, stage: Stage) -> PathBuf {
        self.result_dir().join(format!("{}.md", stage.display_name()))
    }

    /// Whether `.aceflow/` exists.
    pub async fn is_initialized(&self) -> bool {
        fs::try_exists(self.state_dir()).await.unwrap_or(false)
    }

    // === Project state ===

    /// Load `current_state.json`.
    pub async fn load_state(&self) -> Result<Option<ProjectState>> {
        read_json(&self.state_path()).await
    }

    /// Save `current_state.json`.
    pub async fn save_state(&self, state: &ProjectState) -> Result<()> {
        write_json(&self.state_path(), state).await
    }

    /// Load `current_state.json`, failing when the project is not set up.
    pub async fn require_state(&self) -> Result<ProjectState> {
        self.load_state().await?.ok_or_else(|| {
            StorageError::NotFound(format!(
                "No project state at {}; run aceflow_init first",
                self.state_path().display()
            ))
        })
    }

    // === Config documents ===

    /// Load `.aceflow/config.json`.
    pub async fn load_project_config(&self) -> Result<Option<Value>> {
        read_json(&self.config_path()).await
    }

    /// Save `.aceflow/config.json`.
    pub async fn save_project_config(&self, config: &Value) -> Result<()> {
        write_json(&self.config_path(), config).await
    }

    /// Load `.aceflow/runtime_config.json`.
    pub async fn load_runtime_config(&self) -> Result<Option<Value>> {
        read_json(&self.runtime_config_path()).await
    }

    /// Save `.aceflow/runtime_config.json`.
    pub async fn save_runtime_config(&self, config: &Value) -> Result<()> {
        write_json(&self.runtime_config_path(), config).await
    }

    // === Task queue ===

    /// Load `.aceflow/task_queue.json`.
    pub async fn load_task_queue(&self) -> Result<Option<TaskQueue>> {
        read_json(&self.task_queue_path()).await
    }

    /// Save `.aceflow/task_queue.json`.
    pub async fn save_task_queue(&self, queue: &TaskQueue) -> Result<()> {
        write_json(&self.task_queue_path(), queue).await
    }

    // === Collaboration history ===

    /// Load the history entries (empty when absent).
    pub async fn load_history<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        Ok(read_json(&self.history_path()).await?.unwrap_or_default())
    }

    /// Replace the history file.
    pub async fn save_history<T: Serialize>(&self, entries: &[T]) -> Result<()> {
        write_json(&self.history_path(), entries).await
    }

    // === Stage documents ===

    /// Read `aceflow_result/<Stage>.md`.
    pub async fn read_stage_result(&self, stage: Stage) -> Result<Option<String>> {
        read_text(&self.stage_result_path(stage)).await
    }

    /// Write `aceflow_result/<Stage>.md` and return its path.
    pub async fn write_stage_result(&self, stage: Stage, content: &str) -> Result<PathBuf> {
        let path = self.stage_result_path(stage);
        write_atomic(&path, content.as_bytes()).await?;
        Ok(path)
    }

    // === Arbitrary project files ===

    /// Create a directory relative to the root.
    pub async fn create_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let path = self.root.join(relative);
        fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Write a text file relative to the root.
    pub async fn write_file(&self, relative: impl AsRef<Path>, content: &str) -> Result<PathBuf> {
        let path = self.root.join(relative);
        write_atomic(&path, content.as_bytes()).await?;
        Ok(path)
    }
}

/// Read and deserialize a JSON file. A missing file is `Ok(None)`.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    write_atomic(path, content.as_bytes()).await
}

async fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through `<path>.tmp` and rename over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aceflow_core::{InitMode, Task, TaskStatus};
    use tempfile::TempDir;

    fn no_tmp_files(dir: &Path) -> bool {
        std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .all(|e| !e.file_name().to_string_lossy().ends_with(".tmp"))
    }

    #[tokio::test]
    async fn test_missing_files_read_as_none() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path());

        assert!(!store.is_initialized().await);
        assert!(store.load_state().await.unwrap().is_none());
        assert!(store.load_task_queue().await.unwrap().is_none());
        assert!(store.read_stage_result(Stage::Planning).await.unwrap().is_none());
        assert!(store.load_history::<Value>().await.unwrap().is_empty());
        assert!(matches!(store.require_state().await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path());

        let mut state = ProjectState::new("demo", InitMode::Standard);
        state.advance();
        store.save_state(&state).await.unwrap();

        assert!(store.is_initialized().await);
        let loaded = store.require_state().await.unwrap();
        assert_eq!(loaded, state);
        assert!(no_tmp_files(&store.state_dir()));
    }

    #[tokio::test]
    async fn test_task_queue_and_history() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path());

        let mut queue = TaskQueue::new("demo", "planning");
        queue.tasks.push(Task::new("task_1", "Write parser"));
        store.save_task_queue(&queue).await.unwrap();

        let mut loaded = store.load_task_queue().await.unwrap().unwrap();
        assert!(loaded.update_status("task_1", TaskStatus::Completed));
        store.save_task_queue(&loaded).await.unwrap();
        let reloaded = store.load_task_queue().await.unwrap().unwrap();
        assert_eq!(reloaded.tasks[0].status, TaskStatus::Completed);

        store.save_history(&[serde_json::json!({"type": "confirm"})]).await.unwrap();
        let history: Vec<Value> = store.load_history().await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_stage_result_and_files() {
        let temp = TempDir::new().unwrap();
        let store = ProjectStore::new(temp.path());

        let path = store.write_stage_result(Stage::Planning, "# Planning\n").await.unwrap();
        assert_eq!(path, temp.path().join("aceflow_result").join("Planning.md"));
        assert_eq!(store.read_stage_result(Stage::Planning).await.unwrap().as_deref(), Some("# Planning\n"));

        store.create_dir("src").await.unwrap();
        store.write_file("README.md", "hello").await.unwrap();
        assert!(temp.path().join("src").is_dir());
        assert_eq!(std::fs::read_to_string(temp.path().join("README.md")).unwrap(), "hello");
        assert!(no_tmp_files(temp.path()));
        assert!(no_tmp_files(&store.result_dir()));
    }
}
