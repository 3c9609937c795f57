use form_relay::{
    record_store::{RecordStore, StoreError},
    store_writer::StoreWriter,
    submission::{RecordKey, Submission},
};
use tempfile::TempDir;

#[tokio::test]
async fn test_concurrent_appends_are_not_lost() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::new(dir.path().join("data.json"));
    store.init().await.unwrap();

    let (writer, _) = StoreWriter::spawn(store.clone());

    let mut handles = Vec::new();
    for index in 0..50 {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            let key = RecordKey::from(format!("2024-05-01 09:00:00.{:06}", index).as_str());
            let submission = Submission::from_iter([("index", index.to_string())]);
            writer.append(key, submission).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let records = store.load().await.unwrap();
    assert_eq!(records.len(), 50);
    assert_eq!(
        records[&RecordKey::from("2024-05-01 09:00:00.000049")].get("index"),
        Some("49")
    );
}

#[tokio::test]
async fn test_append_reports_corrupt_store_to_caller() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("data.json");
    tokio::fs::write(&path, "garbage").await.unwrap();

    let (writer, _) = StoreWriter::spawn(RecordStore::new(&path));

    let result = writer
        .append(RecordKey::now(), Submission::from_iter([("name", "Alice")]))
        .await;

    assert!(matches!(result, Err(StoreError::Corrupt { .. })));
    assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "garbage");

    // The writer keeps serving after a failed append.
    tokio::fs::write(&path, "{}").await.unwrap();
    writer
        .append(RecordKey::now(), Submission::from_iter([("name", "Bob")]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_append_fails_once_writer_task_is_gone() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::new(dir.path().join("data.json"));
    store.init().await.unwrap();

    let (writer, handle) = StoreWriter::spawn(store);
    handle.abort();
    let _ = handle.await;

    let result = writer
        .append(RecordKey::now(), Submission::from_iter([("name", "Alice")]))
        .await;

    assert!(matches!(result, Err(StoreError::WriterClosed)));
}
