//! Background task engine
//!
//! Any long-running operation can be submitted as a task on the tokio
//! runtime. Submission returns an opaque id that is immediately queryable; a
//! supervisor records the outcome when the task ends. Errors become
//! `{error_message}` results with status `error`, aborted tasks become
//! `cancelled`, and panicked tasks are reported as `lost`.

use chrono::{DateTime, Utc};
use quest_core::error::{QuestError, Result};
use quest_core::models::{DatasetStatus, Metadata};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::context::Quest;
use crate::datasets::DataRequest;
use crate::tools::ToolOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "finished")]
    Finished,
    #[serde(rename = "cancelled")]
    Cancelled,
    #[serde(rename = "lost")]
    Lost,
    #[serde(rename = "error")]
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Finished => "finished",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Lost => "lost",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "finished" => Ok(TaskStatus::Finished),
            "cancelled" => Ok(TaskStatus::Cancelled),
            "lost" => Ok(TaskStatus::Lost),
            "error" => Ok(TaskStatus::Error),
            other => Err(QuestError::invalid_options(
                "task status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub id: String,
    pub fn_name: String,
    pub args: Value,
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Selects tasks; `None` fields match everything
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub ids: Option<Vec<String>>,
    pub status: Option<TaskStatus>,
    pub fn_name: Option<String>,
    /// Every key must be present in the task's args with an equal value
    pub args: Option<Metadata>,
}

impl TaskFilter {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn ids(ids: Vec<String>) -> Self {
        Self {
            ids: Some(ids),
            ..Default::default()
        }
    }

    fn matches(&self, record: &TaskRecord) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&record.id))
            && self.status.map_or(true, |s| s == record.status)
            && self.fn_name.as_ref().map_or(true, |f| f == &record.fn_name)
            && self.args.as_ref().map_or(true, |args| {
                args.iter()
                    .all(|(key, value)| record.args.get(key) == Some(value))
            })
    }
}

struct TaskEntry {
    record: TaskRecord,
    abort: Option<AbortHandle>,
}

type TaskTable = Arc<Mutex<BTreeMap<String, TaskEntry>>>;

/// Store a task's outcome unless it was cancelled while finishing
fn record_outcome(
    table: &mut BTreeMap<String, TaskEntry>,
    id: &str,
    status: TaskStatus,
    result: Value,
) -> bool {
    let Some(entry) = table.get_mut(id) else {
        return false;
    };
    entry.abort = None;
    if entry.record.status == TaskStatus::Cancelled {
        return false;
    }
    entry.record.status = status;
    entry.record.result = Some(result);
    entry.record.finished_at = Some(Utc::now());
    true
}

/// Process-wide task table
pub(crate) struct TaskEngine {
    tasks: TaskTable,
    changes: Arc<watch::Sender<u64>>,
}

impl TaskEngine {
    pub(crate) fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            tasks: Arc::new(Mutex::new(BTreeMap::new())),
            changes: Arc::new(changes),
        }
    }

    pub(crate) async fn spawn<F, T>(&self, fn_name: &str, args: Value, future: F) -> String
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let id = Uuid::new_v4().simple().to_string();
        let record = TaskRecord {
            id: id.clone(),
            fn_name: fn_name.to_string(),
            args,
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            finished_at: None,
        };

        // The entry exists before the supervisor can record an outcome
        let mut table = self.tasks.lock().await;
        let handle = tokio::spawn(future);
        table.insert(
            id.clone(),
            TaskEntry {
                record,
                abort: Some(handle.abort_handle()),
            },
        );
        drop(table);

        let tasks = self.tasks.clone();
        let changes = self.changes.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let (status, result) = match handle.await {
                Ok(Ok(value)) => (
                    TaskStatus::Finished,
                    serde_json::to_value(value).unwrap_or(Value::Null),
                ),
                Ok(Err(e)) => {
                    error!(task = %task_id, error = %e, "Task failed");
                    (TaskStatus::Error, json!({"error_message": e.to_string()}))
                }
                Err(e) if e.is_cancelled() => (
                    TaskStatus::Cancelled,
                    json!({"error_message": "task cancelled"}),
                ),
                Err(e) => {
                    error!(task = %task_id, error = %e, "Task panicked");
                    (TaskStatus::Lost, json!({"error_message": e.to_string()}))
                }
            };

            if record_outcome(&mut *tasks.lock().await, &task_id, status, result) {
                debug!(task = %task_id, status = %status, "Task completed");
                changes.send_modify(|n| *n += 1);
            }
        });

        info!(task = %id, function = %fn_name, "Submitted task");
        id
    }

    pub(crate) async fn list(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        self.tasks
            .lock()
            .await
            .values()
            .map(|entry| &entry.record)
            .filter(|record| filter.matches(record))
            .cloned()
            .collect()
    }

    pub(crate) async fn get(&self, id: &str) -> Result<TaskRecord> {
        self.tasks
            .lock()
            .await
            .get(id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| QuestError::TaskNotFound { id: id.to_string() })
    }

    pub(crate) async fn cancel(&self, ids: &[String]) -> Result<Vec<String>> {
        let mut table = self.tasks.lock().await;
        if let Some(missing) = ids.iter().find(|id| !table.contains_key(id.as_str())) {
            return Err(QuestError::TaskNotFound { id: missing.clone() });
        }

        let mut cancelled = Vec::new();
        for id in ids {
            let Some(entry) = table.get_mut(id) else {
                continue;
            };
            if entry.record.status != TaskStatus::Pending {
                continue;
            }
            if let Some(abort) = entry.abort.take() {
                abort.abort();
            }
            entry.record.status = TaskStatus::Cancelled;
            entry.record.result = Some(json!({"error_message": "task cancelled"}));
            entry.record.finished_at = Some(Utc::now());
            cancelled.push(id.clone());
        }
        drop(table);

        if !cancelled.is_empty() {
            info!(count = cancelled.len(), "Cancelled tasks");
            self.changes.send_modify(|n| *n += 1);
        }
        Ok(cancelled)
    }

    /// Remove finished bookkeeping; pending tasks must be cancelled first
    pub(crate) async fn remove(&self, filter: &TaskFilter) -> Vec<String> {
        let mut table = self.tasks.lock().await;
        let selected: Vec<String> = table
            .values()
            .filter(|entry| filter.matches(&entry.record))
            .map(|entry| entry.record.id.clone())
            .collect();

        let mut removed = Vec::new();
        for id in selected {
            if table.get(&id).is_some_and(|e| e.record.status == TaskStatus::Pending) {
                warn!(task = %id, "Not removing a pending task; cancel it first");
                continue;
            }
            table.remove(&id);
            removed.push(id);
        }
        removed
    }

    /// Wait until no task selected by `filter` is pending
    pub(crate) async fn wait(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        let mut changes = self.changes.subscribe();
        loop {
            let records = self.list(filter).await;
            if records.iter().all(|r| r.status != TaskStatus::Pending) {
                return records;
            }
            if changes.changed().await.is_err() {
                return records;
            }
        }
    }
}

impl Quest {
    /// Run `future` as a background task and return its id
    pub async fn spawn_task<F, T>(&self, fn_name: &str, args: Value, future: F) -> String
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        self.task_engine().spawn(fn_name, args, future).await
    }

    pub async fn get_tasks(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        self.task_engine().list(filter).await
    }

    pub async fn get_task(&self, id: &str) -> Result<TaskRecord> {
        self.task_engine().get(id).await
    }

    /// Abort pending tasks; returns the ids that were still pending
    pub async fn cancel_tasks(&self, ids: &[String]) -> Result<Vec<String>> {
        self.task_engine().cancel(ids).await
    }

    /// Forget completed tasks matching `filter`; returns the removed ids
    pub async fn remove_tasks(&self, filter: &TaskFilter) -> Vec<String> {
        self.task_engine().remove(filter).await
    }

    pub async fn wait_for_tasks(&self, filter: &TaskFilter) -> Vec<TaskRecord> {
        self.task_engine().wait(filter).await
    }

    pub async fn download_datasets_async(
        &self,
        datasets: Vec<String>,
        raise_on_error: bool,
    ) -> String {
        let quest = self.clone();
        let args = json!({"datasets": datasets, "raise_on_error": raise_on_error});
        self.spawn_task("download_datasets", args, async move {
            let statuses: BTreeMap<String, DatasetStatus> =
                quest.download_datasets(&datasets, raise_on_error).await?;
            Ok(statuses)
        })
        .await
    }

    pub async fn get_data_async(&self, request: DataRequest) -> String {
        let quest = self.clone();
        let args = json!({"service_uri": request.service_uri, "collection": request.collection});
        self.spawn_task("get_data", args, async move { quest.get_data(&request).await })
            .await
    }

    pub async fn get_seamless_data_async(&self, request: DataRequest) -> String {
        let quest = self.clone();
        let args = json!({"service_uri": request.service_uri, "collection": request.collection});
        self.spawn_task("get_seamless_data", args, async move {
            quest.get_seamless_data(&request).await
        })
        .await
    }

    pub async fn run_tool_async(&self, name: &str, options: Metadata) -> String {
        let quest = self.clone();
        let tool = name.to_string();
        let args = json!({"name": name, "options": options});
        self.spawn_task("run_tool", args, async move {
            let output: ToolOutput = quest.run_tool(&tool, &options).await?;
            Ok(output)
        })
        .await
    }

    pub async fn publish_async(
        &self,
        publisher_uri: &str,
        dataset: &str,
        options: Metadata,
    ) -> String {
        let quest = self.clone();
        let (publisher, name) = (publisher_uri.to_string(), dataset.to_string());
        let args = json!({
            "publisher_uri": publisher_uri,
            "dataset": dataset,
            "options": options,
        });
        self.spawn_task("publish", args, async move {
            quest.publish(&publisher, &name, &options).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_outcomes_are_recorded() {
        let engine = TaskEngine::new();
        let ok = engine.spawn("ok", json!({}), async { Ok(41 + 1) }).await;
        let failed = engine
            .spawn("failed", json!({}), async {
                Err::<(), _>(QuestError::DatasetNotFound {
                    name: "dmissing".to_string(),
                })
            })
            .await;

        let records = engine.wait(&TaskFilter::default()).await;
        assert_eq!(records.len(), 2);

        let ok = engine.get(&ok).await.unwrap();
        assert_eq!(ok.status, TaskStatus::Finished);
        assert_eq!(ok.result, Some(json!(42)));

        let failed = engine.get(&failed).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(
            failed.result.unwrap()["error_message"],
            "Dataset not found: dmissing"
        );
    }

    #[tokio::test]
    async fn test_cancel_then_remove() {
        let engine = TaskEngine::new();
        let (_tx, rx) = oneshot::channel::<()>();
        let id = engine
            .spawn("blocked", json!({}), async move {
                let _ = rx.await;
                Ok(())
            })
            .await;

        assert_eq!(engine.list(&TaskFilter::status(TaskStatus::Pending)).await.len(), 1);
        assert!(engine.remove(&TaskFilter::default()).await.is_empty());

        assert_eq!(engine.cancel(&[id.clone()]).await.unwrap(), vec![id.clone()]);
        let records = engine.wait(&TaskFilter::ids(vec![id.clone()])).await;
        assert_eq!(records[0].status, TaskStatus::Cancelled);
        assert_eq!(records[0].result.as_ref().unwrap()["error_message"], "task cancelled");

        assert_eq!(engine.remove(&TaskFilter::status(TaskStatus::Cancelled)).await, vec![id]);
        assert!(engine.list(&TaskFilter::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_task_keeps_its_status() {
        let engine = TaskEngine::new();
        let (_tx, rx) = oneshot::channel::<()>();
        let id = engine
            .spawn("blocked", json!({}), async move {
                let _ = rx.await;
                Ok(())
            })
            .await;
        engine.cancel(&[id.clone()]).await.unwrap();

        // The future may finish between the abort and the supervisor's write
        let mut table = engine.tasks.lock().await;
        assert!(!record_outcome(&mut table, &id, TaskStatus::Finished, json!(null)));
        drop(table);

        let record = engine.get(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(record.result.unwrap()["error_message"], "task cancelled");

        engine.wait(&TaskFilter::default()).await;
        assert_eq!(engine.get(&id).await.unwrap().status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_filter_by_args() {
        let engine = TaskEngine::new();
        let a = engine
            .spawn("get_data", json!({"collection": "a", "service_uri": "svc://x:y"}), async {
                Ok(())
            })
            .await;
        engine
            .spawn("get_data", json!({"collection": "b", "service_uri": "svc://x:y"}), async {
                Ok(())
            })
            .await;
        engine.wait(&TaskFilter::default()).await;

        let mut args = Metadata::new();
        args.insert("collection".to_string(), json!("a"));
        let filter = TaskFilter {
            args: Some(args),
            ..Default::default()
        };
        let ids: Vec<String> = engine.list(&filter).await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![a]);

        let mut shared = Metadata::new();
        shared.insert("service_uri".to_string(), json!("svc://x:y"));
        let filter = TaskFilter {
            args: Some(shared),
            fn_name: Some("get_data".to_string()),
            ..Default::default()
        };
        assert_eq!(engine.list(&filter).await.len(), 2);
    }

    #[tokio::test]
    async fn test_panic_is_lost() {
        let engine = TaskEngine::new();
        let id = engine
            .spawn("panics", json!({}), async {
                tokio::time::sleep(Duration::from_millis(1)).await;
                if true {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        engine.wait(&TaskFilter::default()).await;
        assert_eq!(engine.get(&id).await.unwrap().status, TaskStatus::Lost);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let engine = TaskEngine::new();
        assert!(matches!(
            engine.cancel(&["nope".to_string()]).await,
            Err(QuestError::TaskNotFound { .. })
        ));
        assert!("PENDING".parse::<TaskStatus>().is_ok());
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}
