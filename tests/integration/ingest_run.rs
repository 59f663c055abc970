//! Whole runs through the orchestrator with scripted upstreams

use pretty_assertions::assert_eq;
use test_log::test;

use stock_news_ingest::orchestrator::{IngestSources, Orchestrator, SourceOutcome};
use stock_news_ingest::sentiment::LexiconScorer;

use crate::common::test_data::{articles_for, period, test_config};
use crate::common::{logging, Failure, ScriptedSource, TestDatabase};

fn sources(stock: ScriptedSource, news: ScriptedSource) -> IngestSources {
    IngestSources {
        stocks: vec![Box::new(stock)],
        news: Some(Box::new(news)),
    }
}

#[test(tokio::test)]
async fn test_failed_source_does_not_stop_the_others() {
    logging::log_test_step("Stock upstream down, news upstream up");
    let db = TestDatabase::new().await;
    let orchestrator = Orchestrator::new(test_config(&db.path), db.manager.clone(), Box::new(db.store()));
    let sources = sources(
        ScriptedSource::new("stock:SPY").failing_at(period(2021, 1), Failure::Upstream),
        ScriptedSource::new("news").with_records(period(2021, 1), articles_for(period(2021, 1), 5)),
    );

    let summary = orchestrator.run(&sources, LexiconScorer::new()).await.unwrap();

    assert_eq!(summary.failed_sources(), vec!["stock:SPY"]);
    assert_eq!(summary.before.news, 0);
    assert_eq!(summary.before.stock.get("SPY"), Some(&0));
    // News is still INITIAL, so one page of three
    assert_eq!(summary.after.news, 3);
    assert_eq!(summary.after.sentiment_scored, 3);
    assert_eq!(summary.after.sentiment_total, 3);
    assert!(summary.render().contains("stock:SPY failed"));

    let news_report = summary
        .sources
        .iter()
        .find_map(|outcome| match outcome {
            SourceOutcome::Completed(report) if report.source_id == "news" => Some(report),
            _ => None,
        })
        .unwrap();
    assert_eq!(news_report.checkpoint.period, period(2021, 2));

    let stock = orchestrator.store().load("stock:SPY", period(2021, 1)).await.unwrap();
    assert_eq!(stock.run_count, 0);
}

#[test(tokio::test)]
async fn test_auth_failure_aborts_the_run() {
    let db = TestDatabase::new().await;
    let orchestrator = Orchestrator::new(test_config(&db.path), db.manager.clone(), Box::new(db.store()));
    let sources = sources(
        ScriptedSource::new("stock:SPY").failing_at(period(2021, 1), Failure::Auth),
        ScriptedSource::new("news").with_records(period(2021, 1), articles_for(period(2021, 1), 5)),
    );

    let err = orchestrator.run(&sources, LexiconScorer::new()).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(db.manager.count_articles().await.unwrap(), 0);
    assert_eq!(orchestrator.store().load("news", period(2021, 1)).await.unwrap().run_count, 0);
}

#[test(tokio::test)]
async fn test_checkpoint_dir_switches_to_json_files() {
    let db = TestDatabase::new().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(&db.path);
    config.checkpoint_dir = Some(dir.path().to_path_buf());
    let orchestrator = Orchestrator::from_config(config, db.manager.clone()).unwrap();
    let sources = sources(
        ScriptedSource::new("stock:SPY"),
        ScriptedSource::new("news").with_records(period(2021, 1), articles_for(period(2021, 1), 2)),
    );

    let summary = orchestrator.run(&sources, LexiconScorer::new()).await.unwrap();

    assert!(summary.failed_sources().is_empty());
    for file in ["stock_SPY_progress.json", "news_progress.json", "sentiment_progress.json"] {
        assert!(dir.path().join(file).exists(), "{} missing", file);
    }
    assert!(db.manager.get_fetch_state("news").await.unwrap().is_none());
}
