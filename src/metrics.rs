//! Read statistics.
//!
//! Every [`read_json`](crate::read_json) call returns a [`ReadStats`] with the
//! table. The counters describe what the pipeline did, not what the table
//! holds: `bytes_ingested` includes the delimiters written between sources, and
//! `bytes_normalized` is the size after quote normalization.
//!
//! ```no_run
//! use ironjson::{read_json, ReaderOptions, Source};
//!
//! # fn main() -> anyhow::Result<()> {
//! let out = read_json(vec![Source::file("events.jsonl")?], &ReaderOptions::default())?;
//! out.stats.print();
//! out.stats.save_to_file("read-stats.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::time::{Duration, Instant};

/// Counters gathered over one read call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    pub sources: usize,
    pub batches: usize,
    /// Size of the input before planning, with compressed sizes estimated.
    pub estimated_bytes: usize,
    pub bytes_ingested: usize,
    pub delimiters_inserted: usize,
    pub bytes_normalized: usize,
    pub rows: usize,
    /// Malformed records materialized as null rows.
    pub malformed_records: usize,
    /// Batch cuts that needed the planner's forward shift.
    pub shifted_cuts: usize,
    pub elapsed_ms: u64,
}

impl ReadStats {
    /// Add one batch's counters.
    pub fn record_batch(&mut self, requested: usize, ingested: usize, normalized: usize, rows: usize, malformed: usize) {
        self.batches += 1;
        self.bytes_ingested += ingested;
        self.delimiters_inserted += ingested.saturating_sub(requested);
        self.bytes_normalized += normalized;
        self.rows += rows;
        self.malformed_records += malformed;
    }

    pub fn finish(&mut self, started: Instant) {
        self.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Print the counters to stdout in a human-readable format.
    pub fn print(&self) {
        println!("\n=========== JSON Read Stats ===========");
        println!(
            "Elapsed: {:.3}s ({} ms)",
            self.elapsed().as_secs_f64(),
            self.elapsed_ms
        );
        println!("---------------------------------------");
        if let Value::Object(fields) = self.to_json() {
            for (name, value) in fields {
                if name != "elapsed_ms" {
                    println!("{name}: {value}");
                }
            }
        }
        println!("=======================================\n");
    }

    /// Save the counters as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let mut file = File::create(path)?;
        let formatted = serde_json::to_string_pretty(self)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_accumulate() {
        let mut stats = ReadStats::default();
        stats.record_batch(100, 102, 102, 10, 0);
        stats.record_batch(50, 50, 48, 5, 1);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.bytes_ingested, 152);
        assert_eq!(stats.delimiters_inserted, 2);
        assert_eq!(stats.bytes_normalized, 150);
        assert_eq!(stats.rows, 15);
        assert_eq!(stats.malformed_records, 1);
    }

    #[test]
    fn json_has_every_counter() {
        let stats = ReadStats {
            rows: 7,
            ..ReadStats::default()
        };
        let json = stats.to_json();
        assert_eq!(json["rows"], 7);
        assert!(json.get("bytes_normalized").is_some());
    }

    #[test]
    fn save_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let stats = ReadStats {
            batches: 3,
            ..ReadStats::default()
        };
        stats.save_to_file(path.to_str().unwrap()).unwrap();
        let back: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["batches"], 3);
    }
}
