//! Deduplicating writer behaviour

use pretty_assertions::assert_eq;
use test_log::test;

use crate::common::{logging, test_data, TestDatabase};

#[test(tokio::test)]
async fn test_second_identical_write_inserts_nothing() {
    logging::log_test_step("Writing the same page twice");
    let db = TestDatabase::new().await;
    let writer = db.writer();
    let page = test_data::articles_for(test_data::period(2021, 2), 10);

    let first = writer.write(&page, 25).await.unwrap();
    let second = writer.write(&page, 25).await.unwrap();

    assert_eq!(first.inserted, 10);
    assert_eq!(second.inserted, 0);
    assert_eq!(second.duplicates, 10);
    assert_eq!(second.last_key, None);
    assert_eq!(db.manager.count_articles().await.unwrap(), 10);
}

#[test(tokio::test)]
async fn test_every_article_gets_an_empty_sentiment_row() {
    let db = TestDatabase::new().await;
    let page = test_data::articles_for(test_data::period(2021, 2), 3);

    db.writer().write(&page, 25).await.unwrap();

    assert_eq!(db.manager.count_sentiment().await.unwrap(), (0, 3));
    let annotation = db.manager.sentiment_for_article("2021-02-1").await.unwrap().unwrap();
    assert_eq!(annotation.score, None);
    assert_eq!(annotation.magnitude, None);
}

#[test(tokio::test)]
async fn test_same_headline_under_new_uuid_is_a_duplicate() {
    let db = TestDatabase::new().await;
    let writer = db.writer();
    let page = test_data::articles_for(test_data::period(2021, 2), 1);

    let mut reissued = page.clone();
    if let stock_news_ingest::models::Record::Article(article) = &mut reissued[0] {
        article.uuid = "reissued-uuid".to_string();
    }

    writer.write(&page, 25).await.unwrap();
    let summary = writer.write(&reissued, 25).await.unwrap();

    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.duplicates, 1);
    assert_eq!(db.manager.count_sentiment().await.unwrap(), (0, 1));
}
