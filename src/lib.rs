pub mod api;
pub mod checkpoint;
pub mod controller;
pub mod database;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod sentiment;
pub mod writer;

pub use error::{IngestError, Result};
