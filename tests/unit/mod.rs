//! Unit tests against in-memory sources and throwaway databases

mod checkpoint_store;
mod dedup_writer;
