//! Decoder fuzz target: feed arbitrary bytes to the dynamic decoder of a
//! fixed block. Decode must return Ok(Record) or a CodecError, never panic.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use bitblock::{BitString, Block, CodecError, Record, SegmentKind, SegmentOptions, SegmentSize, Value};

    let block = Block::builder("fuzzed")
        .segment("a", 4, SegmentOptions::default())
        .segment("b", 12, SegmentOptions::default())
        .segment(
            "tail",
            SegmentSize::Dynamic,
            SegmentOptions {
                kind: SegmentKind::Bits,
                ..Default::default()
            },
        )
        .build()
        .expect("static block shape");

    let bits = BitString::from_bytes(data.to_vec());
    let mut resolver = |r: &Record, _n: &str, acc: ()| -> Result<(usize, ()), CodecError> {
        let b = r.get("b").and_then(Value::as_u64).unwrap_or(0) as usize;
        Ok((b.min(r.leftover.len()), acc))
    };
    let _ = block.decode_dynamic(&bits, (), &mut resolver);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
