//! Compressed sources: size estimates, hand-off, detection, and full reads.

use ironjson::io::source::CompressedSource;
use ironjson::testing::*;
use ironjson::{CompressionKind, ReadError, ReaderOptions, Source, read_json};

/// Records with pseudo-random payloads, so codecs cannot shrink them much.
fn noisy_records(count: usize) -> Vec<u8> {
    let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
    let mut out = Vec::new();
    for i in 0..count {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        out.extend_from_slice(format!("{{\"n\":{i},\"h\":\"{state:016x}\"}}\n").as_bytes());
    }
    out
}

#[cfg(feature = "compression-gzip")]
mod gzip {
    use super::*;

    #[test]
    fn estimate_is_within_ratio_then_exact_after_whole_read() -> anyhow::Result<()> {
        let data = noisy_records(2_000);
        let packed = compress(CompressionKind::Gzip, &data)?;
        let mut source = CompressedSource::new(packed.as_slice(), CompressionKind::Gzip, 4)?;

        let estimate = source.size();
        assert_eq!(estimate, packed.len() * 4);
        assert!(!source.is_size_exact());
        assert!(estimate <= data.len() * 4 && data.len() <= estimate * 4);

        let read = source.host_read(0, usize::MAX)?;
        assert!(read.is_owned());
        assert_eq!(&*read, data.as_slice());
        drop(read);

        assert_eq!(source.size(), data.len());
        assert!(source.is_size_exact());
        assert!(!source.is_materialized());
        Ok(())
    }

    #[test]
    fn partial_read_caches_content() -> anyhow::Result<()> {
        let data = noisy_records(100);
        let packed = compress(CompressionKind::Gzip, &data)?;
        let mut source = CompressedSource::new(packed.as_slice(), CompressionKind::Gzip, 4)?;

        assert_eq!(&*source.host_read(0, 10)?, &data[..10]);
        assert!(source.is_materialized());
        assert_eq!(&*source.host_read(10, 5)?, &data[10..15]);
        assert_eq!(source.size(), data.len());
        Ok(())
    }

    #[test]
    fn auto_detects_by_magic_and_extension() -> anyhow::Result<()> {
        let first = noisy_records(50);
        let second = noisy_records(30);
        let packed = compress(CompressionKind::Gzip, &second)?;
        let (_dir, paths) = temp_files("part", "jsonl.gz", &[compress(CompressionKind::Gzip, &first)?])?;

        let opts = ReaderOptions::default().with_compression(CompressionKind::Auto);
        let out = read_json(
            vec![Source::file(&paths[0])?, Source::host(&packed), Source::host(b"{\"n\":-1}")],
            &opts,
        )?;
        assert_row_count(&out, 81);
        assert_eq!(int64_column(&out, "n")[80], Some(-1));
        Ok(())
    }

    #[test]
    fn compressed_input_over_budget_is_batched() -> anyhow::Result<()> {
        let data = noisy_records(5_000);
        let packed = compress(CompressionKind::Gzip, &data)?;
        let opts = ReaderOptions::default()
            .with_compression(CompressionKind::Gzip)
            .with_tuning(small_tuning(data.len() / 4));
        let out = read_json(vec![Source::host(&packed), Source::host(&packed)], &opts)?;

        assert!(out.stats.batches >= 8, "{:?}", out.stats);
        assert_row_count(&out, 10_000);
        Ok(())
    }

    #[test]
    fn corrupt_input_is_a_decompression_error() {
        let mut packed = compress(CompressionKind::Gzip, b"{\"a\":1}\n").unwrap_or_default();
        let mid = packed.len() / 2;
        packed.truncate(mid);
        let opts = ReaderOptions::default().with_compression(CompressionKind::Gzip);
        let err = read_json(vec![Source::host(&packed)], &opts).unwrap_err();
        assert!(
            matches!(err, ReadError::Decompression { kind: CompressionKind::Gzip, .. }),
            "{err}"
        );
    }
}

#[cfg(feature = "compression-zstd")]
#[test]
fn eager_kind_reports_exact_size_up_front() -> anyhow::Result<()> {
    let data = noisy_records(200);
    let packed = compress(CompressionKind::Zstd, &data)?;
    let source = Source::compressed(&packed, CompressionKind::Zstd, 4)?;
    assert!(source.is_size_exact());
    assert_eq!(source.size(), data.len());
    Ok(())
}

#[test]
fn every_enabled_codec_reads_the_same_table() -> anyhow::Result<()> {
    let data = noisy_records(300);
    let plain = read_json(vec![Source::host(&data)], &ReaderOptions::default())?;

    for kind in [
        CompressionKind::Gzip,
        CompressionKind::Zip,
        CompressionKind::Snappy,
        CompressionKind::Zstd,
        CompressionKind::Bzip2,
        CompressionKind::Xz,
    ] {
        let Ok(packed) = compress(kind, &data) else {
            continue;
        };
        let opts = ReaderOptions::default().with_compression(kind);
        let out = read_json(vec![Source::host(&packed)], &opts)?;
        assert_eq!(out.table, plain.table, "{kind:?}");
    }
    Ok(())
}

#[test]
fn uncompressed_input_passes_through_auto() -> anyhow::Result<()> {
    let data = numbered_records(0, 10);
    let opts = ReaderOptions::default().with_compression(CompressionKind::Auto);
    let out = read_json(vec![Source::host(&data)], &opts)?;
    assert_row_count(&out, 10);
    Ok(())
}
