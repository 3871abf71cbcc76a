pub mod api;
pub mod config;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod model;
pub mod output;
pub mod punctuality;
pub mod reader;
pub mod reference;
pub mod sources;
pub mod store;

#[cfg(test)]
mod test_utils;
