//! Test: Reporting - idempotent, concurrency-safe upserts

use crate::helpers::*;
use iac_verify::core::config::ReportSettings;
use iac_verify::core::PipelineRun;
use iac_verify::persistence::{InMemoryReportStore, ReportStore};
use iac_verify::report::{FileReportPublisher, ReportBuilder};
use std::sync::Arc;

async fn run_for(change_id: &str, runner: SpyRunner) -> PipelineRun {
    run_steps(Arc::new(runner), &iac_steps(), &pr_context(change_id)).await
}

/// Two upserts for one change leave one report with the second body
#[tokio::test]
async fn test_upsert_twice_keeps_one_report() {
    let store = InMemoryReportStore::new();
    let builder = ReportBuilder::new(ReportSettings::default());

    let first = run_for("42", SpyRunner::new().script("init", Scripted::Exit(1))).await;
    let second = run_for("42", SpyRunner::new().script("plan", Scripted::Output("no changes".to_string()))).await;

    let r1 = builder.upsert(&store, &first).await.unwrap().report;
    let r2 = builder.upsert(&store, &second).await.unwrap().report;

    assert!(r2.revision > r1.revision);
    assert_eq!(r2.body_text, builder.render(&second));

    let all = store.list().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].report.body_text.starts_with("Passed"));
}

/// N changes reported concurrently get N reports at revision 1
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_changes() {
    const N: usize = 25;
    let store = Arc::new(InMemoryReportStore::new());
    let builder = Arc::new(ReportBuilder::new(ReportSettings::default()));

    let mut handles = Vec::new();
    for i in 0..N {
        let store = store.clone();
        let builder = builder.clone();
        handles.push(tokio::spawn(async move {
            let run = run_for(&format!("pr-{}", i), SpyRunner::new()).await;
            builder.upsert(store.as_ref(), &run).await.unwrap().report
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().revision, 1);
    }
    assert_eq!(store.list().await.unwrap().len(), N);
}

/// N concurrent upserts for one change end at revision N with none lost
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_change() {
    const N: u64 = 25;
    let store = Arc::new(InMemoryReportStore::new());
    let builder = Arc::new(ReportBuilder::new(ReportSettings::default()));
    let run = Arc::new(run_for("42", SpyRunner::new()).await);

    let mut handles = Vec::new();
    for _ in 0..N {
        let store = store.clone();
        let builder = builder.clone();
        let run = run.clone();
        handles.push(tokio::spawn(async move {
            builder.upsert(store.as_ref(), &run).await.unwrap().report.revision
        }));
    }

    let mut revisions = Vec::new();
    for handle in handles {
        revisions.push(handle.await.unwrap());
    }
    revisions.sort_unstable();

    assert_eq!(revisions, (1..=N).collect::<Vec<_>>());
    assert_eq!(store.load("42").await.unwrap().unwrap().report.revision, N);
}

/// Concurrent upserts from separate builders still serialize through the store
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_builders_share_store() {
    let store = Arc::new(InMemoryReportStore::new());
    let run = Arc::new(run_for("42", SpyRunner::new()).await);
    let settings = ReportSettings {
        max_conflict_retries: 50,
        ..ReportSettings::default()
    };

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let run = run.clone();
        let builder = ReportBuilder::new(settings.clone());
        handles.push(tokio::spawn(async move {
            builder.upsert(store.as_ref(), &run).await.unwrap().report.revision
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.load("42").await.unwrap().unwrap().report.revision, 8);
}

/// The published file tracks the stored report
#[tokio::test]
async fn test_file_publisher_updates_one_file() {
    let store = InMemoryReportStore::new();
    let dir = tempfile::tempdir().unwrap();
    let builder = ReportBuilder::new(ReportSettings::default())
        .with_publisher(Arc::new(FileReportPublisher::new(dir.path())));

    let failing = run_for("42", SpyRunner::new().script("fmt", Scripted::Exit(3))).await;
    let passing = run_for("42", SpyRunner::new()).await;
    builder.upsert(&store, &failing).await.unwrap();
    builder.upsert(&store, &passing).await.unwrap();

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);

    let comment_id = FileReportPublisher::file_name("42");
    let content = std::fs::read_to_string(dir.path().join(&comment_id)).unwrap();
    assert!(content.starts_with("Passed"));
    let stored = store.load("42").await.unwrap().unwrap();
    assert_eq!(stored.comment_id, Some(comment_id));
}

/// Change ids that differ only in punctuation keep separate files
#[tokio::test]
async fn test_file_publisher_keeps_similar_changes_apart() {
    let store = InMemoryReportStore::new();
    let dir = tempfile::tempdir().unwrap();
    let builder = ReportBuilder::new(ReportSettings::default())
        .with_publisher(Arc::new(FileReportPublisher::new(dir.path())));

    let passing = run_for("feature/vpc", SpyRunner::new()).await;
    let failing = run_for("feature_vpc", SpyRunner::new().script("validate", Scripted::Exit(1))).await;
    builder.upsert(&store, &passing).await.unwrap();
    builder.upsert(&store, &failing).await.unwrap();

    let slash = store.load("feature/vpc").await.unwrap().unwrap().comment_id.unwrap();
    let underscore = store.load("feature_vpc").await.unwrap().unwrap().comment_id.unwrap();
    assert_ne!(slash, underscore);

    assert!(std::fs::read_to_string(dir.path().join(&slash)).unwrap().starts_with("Passed"));
    assert!(std::fs::read_to_string(dir.path().join(&underscore)).unwrap().starts_with("Failed"));
}
