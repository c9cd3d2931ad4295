pub mod batch_upsert;
pub mod comparator;
pub mod conflict_checker;
pub mod ingestion_service;
