pub mod ingestion;
pub mod scheduler;
pub mod tasks;
