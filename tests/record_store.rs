use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use greenlens::{
    BoundingBox, Detection, GeoPoint, InMemoryRecordStore, RecordPipeline, RecordStore,
    SqliteRecordStore, WasteCategory,
};

const CONCURRENT_APPENDS: usize = 50;

fn submit_concurrently(store: Arc<dyn RecordStore>) {
    let pipeline = Arc::new(RecordPipeline::new(store));
    let handles: Vec<_> = (0..CONCURRENT_APPENDS)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            thread::spawn(move || {
                let category = WasteCategory::ALL[i % WasteCategory::ALL.len()];
                let detection = Detection::new(category, 0.9, BoundingBox::default());
                let here = GeoPoint {
                    lat: 40.0 + i as f64 * 0.001,
                    lng: -3.7,
                };
                pipeline
                    .submit(&detection, Some(here))
                    .expect("submit")
                    .expect("accepted")
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("submitter thread");
    }
}

#[test]
fn concurrent_appends_are_all_stored_in_sqlite() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("greenlens.db");
    let store = Arc::new(SqliteRecordStore::open(db_path.to_str().unwrap()).expect("open store"));

    submit_concurrently(store.clone());

    let records = store.list_all().expect("list");
    assert_eq!(records.len(), CONCURRENT_APPENDS);
    let ids: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), CONCURRENT_APPENDS);
}

#[test]
fn concurrent_appends_are_all_stored_in_memory() {
    let store = Arc::new(InMemoryRecordStore::new());
    submit_concurrently(store.clone());
    assert_eq!(store.list_all().expect("list").len(), CONCURRENT_APPENDS);
    assert_eq!(store.version().expect("version"), CONCURRENT_APPENDS as u64);
}

#[test]
fn records_survive_reopen() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("greenlens.db");
    let db_path = db_path.to_str().unwrap();

    let stored = {
        let store = Arc::new(SqliteRecordStore::open(db_path).expect("open store"));
        let pipeline = RecordPipeline::new(store);
        let detection = Detection::new(WasteCategory::PlasticBag, 0.88, BoundingBox::default());
        let here = GeoPoint {
            lat: -33.8688,
            lng: 151.2093,
        };
        pipeline
            .submit(&detection, Some(here))
            .expect("submit")
            .expect("accepted")
    };

    let reopened = SqliteRecordStore::open(db_path).expect("reopen store");
    let records = reopened.list_all().expect("list");
    assert_eq!(records, vec![stored]);
    assert_eq!(reopened.collection(), "greenlens_detections");
}

#[test]
fn persisted_payload_uses_camel_case_layout() {
    let dir = TempDir::new().expect("temp dir");
    let db_path = dir.path().join("layout.db");
    let store = SqliteRecordStore::open(db_path.to_str().unwrap()).expect("open store");
    let pipeline = RecordPipeline::new(Arc::new(store));
    let detection = Detection::new(WasteCategory::Cup, 0.97, BoundingBox::default());
    let record = pipeline
        .submit(&detection, Some(GeoPoint { lat: 1.0, lng: 2.0 }))
        .expect("submit")
        .expect("accepted");

    let conn = rusqlite::Connection::open(&db_path).expect("open raw connection");
    let payload: String = conn
        .query_row(
            "SELECT payload_json FROM records WHERE record_id = ?1",
            [&record.id],
            |row| row.get(0),
        )
        .expect("payload");
    let value: serde_json::Value = serde_json::from_str(&payload).expect("json");
    assert_eq!(value["trashType"], "cup");
    assert_eq!(value["createdAt"], record.created_at);
    assert!(value.get("description").is_none());
}
