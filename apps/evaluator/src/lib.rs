pub mod bootstrap;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod errors;
pub mod evaluation;
pub mod extraction;
pub mod ingest;
pub mod jobs;
pub mod llm_client;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod retrieval;
pub mod routes;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
