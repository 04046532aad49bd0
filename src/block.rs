//! Block and segment descriptors, the builder that assembles them, and the
//! reflection surface derived from them.
//!
//! A [Block] is an ordered list of [Segment]s in wire order. Descriptors are
//! built once, validated in [BlockBuilder::build], and immutable afterwards;
//! they hold no codec state and are safe to share across threads.

use crate::value::{Record, Value};
use thiserror::Error;

/// Base element kind of a segment.
///
/// `bitstring` and `binary` are declaration-level aliases of [Bits](SegmentKind::Bits)
/// and [Bytes](SegmentKind::Bytes) respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Integer,
    Float,
    Bits,
    Bytes,
    Utf8,
    Utf16,
    Utf32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Unsigned,
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

/// Declared size of a segment.
///
/// A fixed size is counted in the kind's native unit: **bytes** for
/// [SegmentKind::Bytes], **bits** for every other kind. Dynamic sizes are
/// supplied at decode time by a resolver, always in bits. `Skip` segments
/// are neither encoded nor decoded; the record field keeps its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentSize {
    Fixed(usize),
    Dynamic,
    Skip,
}

impl From<usize> for SegmentSize {
    fn from(n: usize) -> Self {
        SegmentSize::Fixed(n)
    }
}

/// Scalar segment, or a contiguously packed sequence of scalars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentType {
    Scalar(SegmentKind),
    /// `element_size` is in bits; elements are packed back to back with no
    /// separator, prefix, or terminator.
    Array {
        kind: SegmentKind,
        element_size: usize,
    },
}

impl SegmentType {
    pub fn kind(&self) -> SegmentKind {
        match self {
            SegmentType::Scalar(k) => *k,
            SegmentType::Array { kind, .. } => *kind,
        }
    }
}

/// Immutable description of one segment of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub size: SegmentSize,
    pub ty: SegmentType,
    pub sign: Sign,
    pub endian: Endian,
    /// Placed into new records and kept by skip segments on decode.
    pub default: Value,
}

impl Segment {
    /// Fixed wire size in bits, unit-converted; `None` for dynamic or skip.
    pub fn fixed_bits(&self) -> Option<usize> {
        match self.size {
            SegmentSize::Fixed(n) => Some(match self.ty.kind() {
                SegmentKind::Bytes => n * 8,
                _ => n,
            }),
            SegmentSize::Dynamic | SegmentSize::Skip => None,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.size == SegmentSize::Dynamic
    }
}

/// Options for a scalar segment declaration.
#[derive(Debug, Clone)]
pub struct SegmentOptions {
    pub kind: SegmentKind,
    pub sign: Sign,
    pub endian: Endian,
    pub default: Value,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        SegmentOptions {
            kind: SegmentKind::Integer,
            sign: Sign::Unsigned,
            endian: Endian::Big,
            default: Value::Nil,
        }
    }
}

/// Options for an array segment declaration. Arrays are always dynamic at
/// the block level: their total wire size comes from the resolver.
#[derive(Debug, Clone)]
pub struct ArrayOptions {
    pub kind: SegmentKind,
    pub element_size: usize,
    pub sign: Sign,
    pub endian: Endian,
    pub default: Value,
}

impl Default for ArrayOptions {
    fn default() -> Self {
        ArrayOptions {
            kind: SegmentKind::Integer,
            element_size: 8,
            sign: Sign::Unsigned,
            endian: Endian::Big,
            default: Value::Nil,
        }
    }
}

/// Construction-time violations reported by [BlockBuilder::build].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("duplicate segment name `{0}`")]
    DuplicateSegment(String),
    #[error("`leftover` is reserved for the implicit trailing field")]
    ReservedName,
    #[error("segment `{0}` is fixed-size but declared after a dynamic segment")]
    FixedAfterDynamic(String),
    #[error("segment `{name}`: {reason}")]
    InvalidWidth { name: String, reason: String },
}

/// Ordered segment list plus the derived static/dynamic partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub(crate) name: String,
    pub(crate) segments: Vec<Segment>,
    /// Indices of dynamic segments, in declaration order.
    pub(crate) dynamic: Vec<usize>,
    /// Total bit length of the fixed-size prefix.
    pub(crate) static_bits: usize,
}

impl Block {
    pub fn builder(name: impl Into<String>) -> BlockBuilder {
        BlockBuilder {
            name: name.into(),
            segments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment names in declaration order. The implicit `leftover` field is
    /// not included.
    pub fn segments(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }

    /// Full descriptor of a named segment, or `None` for unknown names.
    pub fn segment_info(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// True when the block has at least one dynamic segment.
    pub fn is_dynamic(&self) -> bool {
        !self.dynamic.is_empty()
    }

    /// Bit length of the fixed-size prefix.
    pub fn static_bits(&self) -> usize {
        self.static_bits
    }

    /// A fresh record with every declared field at its default and an empty
    /// `leftover`.
    pub fn record(&self) -> Record {
        let mut record = Record::new();
        for seg in &self.segments {
            record.set(seg.name.clone(), seg.default.clone());
        }
        record
    }
}

/// Assembles and validates a [Block] from `segment`/`array` declarations.
#[derive(Debug)]
pub struct BlockBuilder {
    name: String,
    segments: Vec<Segment>,
}

impl BlockBuilder {
    /// Declares a scalar segment. `size` accepts a plain bit/byte count
    /// (fixed), [SegmentSize::Dynamic], or [SegmentSize::Skip].
    pub fn segment(
        mut self,
        name: impl Into<String>,
        size: impl Into<SegmentSize>,
        opts: SegmentOptions,
    ) -> Self {
        self.segments.push(Segment {
            name: name.into(),
            size: size.into(),
            ty: SegmentType::Scalar(opts.kind),
            sign: opts.sign,
            endian: opts.endian,
            default: opts.default,
        });
        self
    }

    /// Declares an array segment (always dynamic).
    pub fn array(mut self, name: impl Into<String>, opts: ArrayOptions) -> Self {
        self.segments.push(Segment {
            name: name.into(),
            size: SegmentSize::Dynamic,
            ty: SegmentType::Array {
                kind: opts.kind,
                element_size: opts.element_size,
            },
            sign: opts.sign,
            endian: opts.endian,
            default: opts.default,
        });
        self
    }

    pub fn build(self) -> Result<Block, BlockError> {
        let mut dynamic = Vec::new();
        let mut static_bits = 0usize;

        for (i, seg) in self.segments.iter().enumerate() {
            if seg.name == "leftover" {
                return Err(BlockError::ReservedName);
            }
            if self.segments[..i].iter().any(|s| s.name == seg.name) {
                return Err(BlockError::DuplicateSegment(seg.name.clone()));
            }
            check_widths(seg)?;

            match seg.size {
                SegmentSize::Dynamic => dynamic.push(i),
                SegmentSize::Fixed(_) => {
                    if !dynamic.is_empty() {
                        return Err(BlockError::FixedAfterDynamic(seg.name.clone()));
                    }
                    static_bits += seg.fixed_bits().unwrap_or(0);
                }
                SegmentSize::Skip => {}
            }
        }

        Ok(Block {
            name: self.name,
            segments: self.segments,
            dynamic,
            static_bits,
        })
    }
}

fn check_widths(seg: &Segment) -> Result<(), BlockError> {
    let err = |reason: &str| BlockError::InvalidWidth {
        name: seg.name.clone(),
        reason: reason.to_string(),
    };

    match &seg.ty {
        SegmentType::Scalar(kind) => {
            if let SegmentSize::Fixed(n) = seg.size {
                match kind {
                    SegmentKind::Integer if n > 64 => {
                        return Err(err("integer segments are limited to 64 bits"));
                    }
                    SegmentKind::Float if !matches!(n, 16 | 32 | 64) => {
                        return Err(err("float width must be 16, 32, or 64 bits"));
                    }
                    SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32 => {
                        return Err(err("utf segments take no fixed size"));
                    }
                    _ => {}
                }
            }
        }
        SegmentType::Array { kind, element_size } => {
            match kind {
                SegmentKind::Integer if *element_size > 64 => {
                    return Err(err("integer elements are limited to 64 bits"));
                }
                SegmentKind::Float if !matches!(element_size, 16 | 32 | 64) => {
                    return Err(err("float element width must be 16, 32, or 64 bits"));
                }
                SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32 => {
                    return Err(err("utf kinds cannot be array elements"));
                }
                _ => {}
            }
            if *element_size == 0 {
                return Err(err("array element size must be nonzero"));
            }
        }
    }
    Ok(())
}
