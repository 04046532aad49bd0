//! # bitblock: declarative bit-blocks with a symmetric bit-level codec
//!
//! Define records as ordered lists of bit-aligned segments, then encode
//! them to raw bit sequences and decode them back from one declaration.
//! Aimed at bit-oriented wire protocols (IPv4-style headers, telemetry
//! frames, link protocols) that would otherwise need hand-written pairs of
//! pack/unpack routines.
//!
//! ## Segments
//!
//! - Kinds: `integer`, `float`, `bits`/`bitstring`, `bytes`/`binary`,
//!   `utf8`, `utf16`, `utf32`, plus packed arrays of any non-utf kind
//! - Signedness (`signed`/`unsigned`) and endianness (`big`/`little`) per
//!   segment; sizes at arbitrary bit boundaries, not byte-aligned
//! - Sizes: fixed at declaration time, `dynamic` (resolved mid-decode from
//!   already-decoded fields), or skip (field exists, nothing on the wire)
//! - Every block carries an implicit trailing `leftover` bit string with
//!   whatever the decoder did not consume
//!
//! ## Declaring blocks
//!
//! Programmatically:
//!
//! ```
//! use bitblock::{Block, SegmentOptions, SegmentSize};
//!
//! let block = Block::builder("frame")
//!     .segment("version", 4, SegmentOptions::default())
//!     .segment("flags", 4, SegmentOptions::default())
//!     .segment("payload", SegmentSize::Dynamic, SegmentOptions {
//!         kind: bitblock::SegmentKind::Bits,
//!         ..Default::default()
//!     })
//!     .build()
//!     .unwrap();
//! assert_eq!(block.segments(), vec!["version", "flags", "payload"]);
//! ```
//!
//! Or from the declaration DSL:
//!
//! ```text
//! block frame {
//!     version: uint(4) = 1;
//!     flags: uint(4);
//!     payload: dynamic bits;
//! }
//! ```
//!
//! ## Dynamic segments
//!
//! A dynamic segment's wire size is supplied at decode time by a
//! [SizeResolver] that sees the partially-decoded record and threads an
//! accumulator across segments, in declaration order. On both sides of the
//! codec a dynamic field holds a [DynamicSegment] envelope (`value` +
//! `size_bits`), never a bare scalar.
//!
//! ## Usage
//!
//! See `tests/integration.rs` for complete round trips, including an IPv4
//! datagram with variable options and payload.

pub mod bits;
pub mod block;
pub mod codec;
pub mod dump;
pub mod parser;
pub mod value;

pub use bits::{count_ones, BitReader, BitString};
pub use block::{
    ArrayOptions, Block, BlockBuilder, BlockError, Endian, Segment, SegmentKind, SegmentOptions,
    SegmentSize, SegmentType, Sign,
};
pub use codec::{decode_segment, encode_segment, CodecError, SegmentOpts, SizeResolver};
pub use parser::parse;
pub use value::{DynamicSegment, Record, Value};
