//! Read statistics returned with every table.

use ironjson::testing::*;
use ironjson::{ReaderOptions, Source, read_json};

#[test]
fn stats_describe_the_read() -> anyhow::Result<()> {
    let a = numbered_records(0, 200);
    let b = br#"{'n':200}"#.to_vec();
    let opts = ReaderOptions::default().with_tuning(small_tuning(500));
    let out = read_json(vec![Source::host(&a), Source::host(&b)], &opts)?;
    let stats = &out.stats;

    assert_eq!(stats.sources, 2);
    assert_eq!(stats.estimated_bytes, a.len() + b.len());
    assert_eq!(stats.rows, 201);
    assert!(stats.batches > 1);
    // Only the batch that reaches the end of `a` continues into `b`.
    assert_eq!(stats.delimiters_inserted, 1);
    assert_eq!(stats.bytes_ingested, a.len() + b.len() + 1);
    assert_eq!(stats.bytes_normalized, stats.bytes_ingested);
    assert_eq!(stats.malformed_records, 0);

    let json = stats.to_json();
    assert_eq!(json["rows"], 201);
    Ok(())
}

#[test]
fn stats_round_trip_through_a_file() -> anyhow::Result<()> {
    let data = numbered_records(0, 3);
    let out = read_json(vec![Source::host(&data)], &ReaderOptions::default())?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("stats.json");
    out.stats.save_to_file(path.to_str().unwrap_or("stats.json"))?;
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(saved["rows"], 3);
    assert_eq!(saved["batches"], 1);
    Ok(())
}
