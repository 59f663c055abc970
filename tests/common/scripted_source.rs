//! In-memory `RecordSource` with per-period data and injectable failures

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use stock_news_ingest::api::{FetchRequest, FetchedPage, RecordSource};
use stock_news_ingest::error::{IngestError, Result};
use stock_news_ingest::models::{Period, Record};

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Upstream,
    Auth,
}

pub struct ScriptedSource {
    source_id: String,
    pages: HashMap<Period, Vec<Record>>,
    failures: HashMap<Period, Failure>,
    calls: Mutex<Vec<FetchRequest>>,
}

impl ScriptedSource {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            pages: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_records(mut self, period: Period, records: Vec<Record>) -> Self {
        self.pages.insert(period, records);
        self
    }

    pub fn failing_at(mut self, period: Period, failure: Failure) -> Self {
        self.failures.insert(period, failure);
        self
    }

    /// Every request seen so far, in order
    pub fn calls(&self) -> Vec<FetchRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl RecordSource for ScriptedSource {
    fn source_id(&self) -> String {
        self.source_id.clone()
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage> {
        self.calls.lock().unwrap().push(*request);

        match self.failures.get(&request.period) {
            Some(Failure::Upstream) => {
                return Err(IngestError::UpstreamUnavailable(format!("scripted outage at {}", request.period)))
            }
            Some(Failure::Auth) => return Err(IngestError::Auth("scripted bad key".to_string())),
            None => {}
        }

        let records: Vec<Record> = self
            .pages
            .get(&request.period)
            .map(|all| all.iter().skip(request.offset as usize).take(request.limit).cloned().collect())
            .unwrap_or_default();
        let upstream_len = records.len();
        Ok(FetchedPage { records, upstream_len })
    }
}
