//! Multi-batch reads under a small injected budget.

use ironjson::testing::*;
use ironjson::{
    BATCH_SIZE_ENV, BatchTuning, ByteRange, CompressionKind, ReadError, ReaderOptions, Source,
    SourceSet, planner::plan_batches, read_json,
};

const SOURCES: usize = 10;
const DOUBLINGS: u32 = 8;

#[test]
fn inflated_input_splits_into_batches() -> anyhow::Result<()> {
    let block = repeat_block(SAMPLE_BLOCK, DOUBLINGS);
    let total = block.len() * SOURCES;
    let budget = total / 5;

    let opts = ReaderOptions::default().with_tuning(small_tuning(budget));
    let out = read_json((0..SOURCES).map(|_| Source::host(&block)).collect(), &opts)?;

    assert!(out.stats.batches > 1, "{:?}", out.stats);
    assert_row_count(&out, SAMPLE_BLOCK_RECORDS * (1 << DOUBLINGS) * SOURCES);
    assert_eq!(
        int64_column(&out, "id")[..8],
        [1i64, 2, 3, 4, 1, 2, 3, 4].map(Some)
    );
    Ok(())
}

#[test]
fn inflated_files_split_into_batches() -> anyhow::Result<()> {
    let block = repeat_block(SAMPLE_BLOCK, DOUBLINGS);
    let (_dir, paths) = temp_files("events", "jsonl", &vec![block.clone(); SOURCES])?;
    let sources = paths.iter().map(Source::file).collect::<ironjson::Result<Vec<_>>>()?;

    let opts = ReaderOptions::default().with_tuning(small_tuning(block.len() * 3));
    let out = read_json(sources, &opts)?;

    assert!(out.stats.batches >= 3);
    assert_row_count(&out, SAMPLE_BLOCK_RECORDS * (1 << DOUBLINGS) * SOURCES);
    Ok(())
}

#[test]
fn under_budget_input_is_one_batch() -> anyhow::Result<()> {
    let block = repeat_block(SAMPLE_BLOCK, 3);
    let opts = ReaderOptions::default();
    let out = read_json(vec![Source::host(&block), Source::host(&block)], &opts)?;
    assert_eq!(out.stats.batches, 1);
    assert_eq!(out.stats.delimiters_inserted, 1);
    assert_row_count(&out, SAMPLE_BLOCK_RECORDS * 16);
    Ok(())
}

#[test]
fn planned_batches_tile_the_stream() -> anyhow::Result<()> {
    let parts: Vec<Vec<u8>> = (0..SOURCES).map(|i| numbered_records(i * 100, 100)).collect();
    let mut sources = SourceSet::new(
        parts.iter().map(|p| Source::host(p)).collect(),
        CompressionKind::None,
        4,
    )?;
    let total = sources.total_size();

    let plan = plan_batches(&mut sources, ByteRange::to_end(0), b'\n', true, &small_tuning(1_500))?;
    let mut next = 0;
    for batch in plan.iter() {
        assert_eq!(batch.range.offset, next);
        assert!(batch.range.size <= 1_500);
        next = batch.range.end();
    }
    assert_eq!(next, total);
    assert_eq!(plan.exact_size, Some(total));
    Ok(())
}

#[test]
fn budget_comes_from_override_lookup() -> anyhow::Result<()> {
    let tuning = BatchTuning::default()
        .with_overrides(|key| (key == BATCH_SIZE_ENV).then(|| " 150000 ".to_string()))?;
    assert_eq!(tuning.max_batch_bytes, 150_000);
    assert_eq!(tuning.subchunk_size(), 15_000);

    let err = BatchTuning::default()
        .with_overrides(|_| Some("lots".to_string()))
        .unwrap_err();
    assert!(matches!(err, ReadError::InvalidOptions(_)));

    let err = BatchTuning::default().with_overrides(|_| Some("100".to_string())).unwrap_err();
    assert!(matches!(err, ReadError::InvalidOptions(_)));
    Ok(())
}

#[test]
fn oversized_record_has_no_safe_split() {
    let mut data = b"{\"blob\":\"".to_vec();
    data.extend(std::iter::repeat_n(b'x', 5_000));
    data.extend_from_slice(b"\"}\n");

    let opts = ReaderOptions::default().with_tuning(small_tuning(1_000));
    let err = read_json(vec![Source::host(&data)], &opts).unwrap_err();
    assert!(
        matches!(err, ReadError::NoSafeSplitPoint { searched: 200, .. }),
        "{err}"
    );
}
