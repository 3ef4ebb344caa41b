//! The `persistence` module is the file-backed side of every transfer.
//!
//! Drained messages are appended one JSON record per line to a `.jsonl`
//! file as they arrive, so memory use does not grow with the backlog.
//! Publishing reads them back lazily. Older captures stored as a single
//! JSON array (`.json`) are read through the same reader.

pub mod jsonl_store;

pub use jsonl_store::{
    LEGACY_FILE_EXTENSION, RECORD_FILE_EXTENSION, RecordReader, RecordWriter,
    default_drain_file_name, latest_drain_file, list_candidate_files,
};

#[cfg(test)]
mod tests;
