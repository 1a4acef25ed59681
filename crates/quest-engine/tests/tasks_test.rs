//! Background task tests: submit, observe, cancel and clean up

mod common;

use common::{bbox_filter, options, quest_with, MockNwis, IV};
use quest_core::models::DatasetStatus;
use quest_engine::{DataRequest, TaskFilter, TaskStatus};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Semaphore;

async fn staged_datasets(quest: &quest_engine::Quest, count: usize) -> Vec<String> {
    quest.new_collection("c1", None, None, None).await.unwrap();
    let entries = vec!["svc://usgs-nwis:iv/08158000"; count];
    let added = quest.add_datasets("c1", &entries).await.unwrap();
    quest
        .stage_for_download(&added, options(json!({"period": "P1D"})))
        .await
        .unwrap();
    added
}

#[tokio::test]
async fn test_async_downloads_finish_and_are_removed() {
    let tmp = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let nwis = Arc::new(MockNwis::gated(gate.clone()));
    let quest = quest_with(&tmp, nwis.clone());
    let datasets = staged_datasets(&quest, 3).await;

    let mut ids = Vec::new();
    for dataset in &datasets {
        ids.push(quest.download_datasets_async(vec![dataset.clone()], false).await);
    }

    let pending = quest.get_tasks(&TaskFilter::default()).await;
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|t| t.status == TaskStatus::Pending));
    assert!(pending.iter().all(|t| t.fn_name == "download_datasets"));

    // Pending tasks are kept by remove_tasks
    assert!(quest.remove_tasks(&TaskFilter::default()).await.is_empty());

    gate.add_permits(3);
    let done = quest.wait_for_tasks(&TaskFilter::default()).await;
    assert!(done.iter().all(|t| t.status == TaskStatus::Finished));
    assert_eq!(nwis.downloads(), 3);

    for (id, dataset) in ids.iter().zip(&datasets) {
        let task = quest.get_task(id).await.unwrap();
        assert_eq!(task.result, Some(json!({ dataset.clone(): "downloaded" })));
        assert!(task.finished_at.is_some());
    }
    assert_eq!(
        quest.get_dataset(&datasets[0]).await.unwrap().status,
        DatasetStatus::Downloaded
    );

    let removed = quest
        .remove_tasks(&TaskFilter::status(TaskStatus::Finished))
        .await;
    assert_eq!(removed.len(), 3);
    assert!(quest.get_tasks(&TaskFilter::default()).await.is_empty());
}

#[tokio::test]
async fn test_cancelled_download_is_reported() {
    let tmp = TempDir::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let quest = quest_with(&tmp, Arc::new(MockNwis::gated(gate)));
    let datasets = staged_datasets(&quest, 1).await;

    let id = quest.download_datasets_async(datasets, false).await;
    assert_eq!(quest.cancel_tasks(&[id.clone()]).await.unwrap(), vec![id.clone()]);

    let records = quest.wait_for_tasks(&TaskFilter::ids(vec![id.clone()])).await;
    assert_eq!(records[0].status, TaskStatus::Cancelled);
    assert_eq!(
        records[0].result.as_ref().unwrap()["error_message"],
        "task cancelled"
    );

    // Already finished tasks are not cancelled again
    assert!(quest.cancel_tasks(&[id]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_task_errors_are_captured() {
    let tmp = TempDir::new().unwrap();
    let quest = quest_with(&tmp, Arc::new(MockNwis::default()));

    let id = quest
        .get_data_async(DataRequest::new(IV).max_catalog_entries(1))
        .await;
    let task = quest.wait_for_tasks(&TaskFilter::ids(vec![id])).await.remove(0);
    assert_eq!(task.status, TaskStatus::Error);
    let message = task.result.unwrap()["error_message"].as_str().unwrap().to_string();
    assert!(message.contains("returned 3 catalog entries"));

    let id = quest
        .get_data_async(DataRequest::new(IV).filter("bbox", bbox_filter()).collection("c9"))
        .await;
    let task = quest.wait_for_tasks(&TaskFilter::ids(vec![id])).await.remove(0);
    assert_eq!(task.status, TaskStatus::Finished);
    assert_eq!(task.result.unwrap().as_array().map(Vec::len), Some(1));
}
