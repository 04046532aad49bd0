//! Benchmark: encode, decode, and encode+decode round-trip over a synthetic
//! telemetry-style block with a fixed header and two dynamic tail segments.
//! Each mode runs across a small corpus of records so dynamic sizes vary.

use bitblock::{
    ArrayOptions, BitString, Block, CodecError, Record, SegmentKind, SegmentOptions, SegmentSize,
    Sign, Value,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn telemetry_block() -> Block {
    Block::builder("telemetry")
        .segment("version", 4, SegmentOptions::default())
        .segment("source", 12, SegmentOptions::default())
        .segment("count", 8, SegmentOptions::default())
        .segment(
            "flags",
            SegmentSize::Dynamic,
            SegmentOptions {
                kind: SegmentKind::Bits,
                ..Default::default()
            },
        )
        .array(
            "samples",
            ArrayOptions {
                element_size: 12,
                sign: Sign::Signed,
                ..Default::default()
            },
        )
        .build()
        .expect("build")
}

fn corpus(block: &Block) -> Vec<Record> {
    (0u64..64)
        .map(|i| {
            let count = (i % 16) as usize;
            let mut flags = BitString::new();
            flags.push_bits(i, 5);
            let samples: Vec<Value> = (0..count)
                .map(|j| Value::Int(((j as i64) - 8) * 31))
                .collect();
            block
                .record()
                .with("version", Value::Uint(1))
                .with("source", Value::Uint(i * 17 % 4096))
                .with("count", Value::Uint(count as u64))
                .with("flags", Value::dynamic(Value::Bits(flags), 5))
                .with(
                    "samples",
                    Value::dynamic(Value::List(samples), count * 12),
                )
        })
        .collect()
}

fn resolver(record: &Record, name: &str, acc: usize) -> Result<(usize, usize), CodecError> {
    match name {
        "flags" => Ok((5, acc)),
        _ => {
            let count = record.get("count").and_then(Value::as_u64).unwrap_or(0);
            Ok(((count * 12) as usize, acc))
        }
    }
}

fn bench_roundtrip(c: &mut Criterion) {
    let block = telemetry_block();
    let records = corpus(&block);
    let encoded: Vec<BitString> = records
        .iter()
        .map(|r| block.encode(r).expect("encode"))
        .collect();

    c.bench_function("encode", |b| {
        b.iter(|| {
            for record in &records {
                black_box(block.encode(black_box(record)).expect("encode"));
            }
        })
    });

    c.bench_function("decode", |b| {
        b.iter(|| {
            for bits in &encoded {
                let mut r = resolver;
                black_box(
                    block
                        .decode_dynamic(black_box(bits), 0usize, &mut r)
                        .expect("decode"),
                );
            }
        })
    });

    c.bench_function("encode_decode", |b| {
        b.iter(|| {
            for record in &records {
                let bits = block.encode(black_box(record)).expect("encode");
                let mut r = resolver;
                black_box(
                    block
                        .decode_dynamic(&bits, 0usize, &mut r)
                        .expect("decode"),
                );
            }
        })
    });
}

criterion_group!(benches, bench_roundtrip);
criterion_main!(benches);
