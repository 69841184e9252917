//! Input side of the reader: sources, compression, and raw ingestion.

pub mod compression;
pub mod glob;
pub mod ingest;
pub mod source;
