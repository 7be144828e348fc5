//! Run store behaviour under concurrency and across backends

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use trueno_eval::types::{Example, MetricResult, ModelResponse, Prediction};
use trueno_eval::{MemoryRunStore, Run, RunStore, SqliteRunStore};

fn run(name: &str, minute: i64) -> Run {
    let started_at = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::minutes(minute);
    let example = Example::text(format!("{name}-e1"), "great", json!("positive"));
    Run {
        id: None,
        name: name.to_string(),
        task: "text-classification".to_string(),
        config_name: "sentiment-keyword".to_string(),
        config_path: None,
        started_at,
        completed_at: started_at + Duration::seconds(2),
        duration: 2.0,
        metrics: vec![MetricResult::new("accuracy", 1.0)],
        predictions: vec![Prediction::from_response(
            &example,
            ModelResponse::new(json!("positive")),
        )],
        artifact_path: None,
    }
}

fn concurrent_saves(store: Arc<dyn RunStore>) {
    const WRITERS: i64 = 4;
    const RUNS_PER_WRITER: i64 = 10;

    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..RUNS_PER_WRITER)
                    .map(|i| {
                        let minute = writer * RUNS_PER_WRITER + i;
                        let saved = store.save(run(&format!("w{writer}-r{i}"), minute)).unwrap();
                        // Reads interleave with other writers' saves.
                        assert!(!store.list().unwrap().is_empty());
                        saved.id.unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let ids: BTreeSet<i64> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    let expected = usize::try_from(WRITERS * RUNS_PER_WRITER).unwrap();
    assert_eq!(ids.len(), expected);

    let listed = store.list().unwrap();
    assert_eq!(listed.len(), expected);
    assert!(listed
        .windows(2)
        .all(|pair| pair[0].completed_at >= pair[1].completed_at));

    for id in ids {
        let detail = store.get(id).unwrap();
        assert_eq!(detail.predictions.len(), 1);
        assert!(detail.predictions[0].uid.starts_with(&detail.summary.name));
    }
}

#[test]
fn test_sqlite_concurrent_saves_lose_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteRunStore::open(dir.path().join("runs.db")).unwrap();
    concurrent_saves(Arc::new(store));
}

#[test]
fn test_memory_concurrent_saves_lose_nothing() {
    concurrent_saves(Arc::new(MemoryRunStore::new()));
}

#[test]
fn test_list_is_most_recent_first() {
    let store = SqliteRunStore::open_in_memory().unwrap();
    store.save(run("middle", 5)).unwrap();
    store.save(run("latest", 10)).unwrap();
    store.save(run("earliest", 0)).unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["latest", "middle", "earliest"]);
}

#[test]
fn test_summary_json_shape() {
    let store = MemoryRunStore::new();
    let saved = store.save(run("shape", 0)).unwrap();
    let detail = store.get(saved.id.unwrap()).unwrap();

    let summary = serde_json::to_value(&detail.summary).unwrap();
    for key in [
        "id",
        "name",
        "task",
        "config_name",
        "config_path",
        "started_at",
        "completed_at",
        "duration",
        "metrics",
    ] {
        assert!(summary.get(key).is_some(), "summary is missing '{key}'");
    }
    assert!(summary.get("predictions").is_none());

    let full = serde_json::to_value(&detail).unwrap();
    assert_eq!(full["predictions"][0]["predicted_output"], json!("positive"));
}
