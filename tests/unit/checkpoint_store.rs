//! Both checkpoint backends behave the same

use pretty_assertions::assert_eq;
use test_log::test;

use stock_news_ingest::checkpoint::{CheckpointStore, JsonFileCheckpointStore};
use stock_news_ingest::models::Checkpoint;

use crate::common::{test_data, TestDatabase};

async fn exercise(store: &dyn CheckpointStore) {
    let start = test_data::period(2021, 1);

    assert_eq!(store.load("news", start).await.unwrap(), Checkpoint::initial("news", start));

    let saved = Checkpoint {
        cursor: Some("2021-04-2".to_string()),
        offset: 6,
        ..test_data::checkpoint_at("news", test_data::period(2021, 4), 5)
    };
    store.save(&saved).await.unwrap();
    assert_eq!(store.load("news", start).await.unwrap(), saved);

    // Other sources are independent
    assert_eq!(store.load("stock:SPY", start).await.unwrap().run_count, 0);

    assert!(store.reset("news").await.unwrap());
    assert_eq!(store.load("news", start).await.unwrap(), Checkpoint::initial("news", start));
}

#[test(tokio::test)]
async fn test_sqlite_store_round_trip() {
    let db = TestDatabase::new().await;
    exercise(&db.store()).await;
}

#[test(tokio::test)]
async fn test_json_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    exercise(&store).await;
}
