//! Integration tests: HTTP clients against a mock server and full runs

mod alpha_vantage_api;
mod ingest_run;
