//! Encode/decode segments and whole blocks.
//!
//! The primitive codec handles one segment's worth of bits across the full
//! {kind x sign x endian x size} cross-product; the array codec packs
//! homogeneous element sequences contiguously on top of it; the block codec
//! walks a [Block] descriptor in wire order, consuming the fixed prefix
//! directly and the dynamic tail under the resolver protocol.
//!
//! A declared or supplied `size` is counted in **bytes** for the bytes kind
//! and in **bits** for every other kind. Resolver results are always bits;
//! the block decoder converts.

use crate::bits::{sign_extend, BitReader, BitString};
use crate::block::{Block, Endian, Segment, SegmentKind, SegmentSize, SegmentType, Sign};
use crate::value::{Record, Value};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("size underflow: need {needed} bits, {available} available")]
    SizeUnderflow { needed: usize, available: usize },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("invalid size: {0}")]
    InvalidSize(String),
    #[error("resolver: {0}")]
    Resolver(String),
}

impl CodecError {
    fn underflow(needed: usize, available: usize) -> Self {
        CodecError::SizeUnderflow { needed, available }
    }

    /// Prefixes mismatch messages with the segment name; other kinds pass
    /// through untouched.
    fn at(self, segment: &str) -> Self {
        match self {
            CodecError::TypeMismatch(m) => {
                CodecError::TypeMismatch(format!("segment `{}`: {}", segment, m))
            }
            other => other,
        }
    }
}

/// Options for the primitive codec.
///
/// `size` is in the kind's native unit (see module docs). When omitted:
/// 8 bits for integer values, 64 for floats; bytes/bits/utf derive the size
/// from the value itself on encode and consume the whole input on decode.
#[derive(Debug, Clone)]
pub struct SegmentOpts {
    pub size: Option<usize>,
    pub kind: SegmentKind,
    pub sign: Sign,
    pub endian: Endian,
    /// For utf kinds on decode: decode the entire input as text instead of
    /// consuming a single codepoint.
    pub text: bool,
}

impl Default for SegmentOpts {
    fn default() -> Self {
        SegmentOpts {
            size: None,
            kind: SegmentKind::Integer,
            sign: Sign::Unsigned,
            endian: Endian::Big,
            text: false,
        }
    }
}

impl SegmentOpts {
    fn for_segment(seg: &Segment, size: Option<usize>) -> Self {
        SegmentOpts {
            size,
            kind: seg.ty.kind(),
            sign: seg.sign,
            endian: seg.endian,
            text: matches!(seg.default, Value::Str(_)),
        }
    }
}

// ---------------------------------------------------------------------------
// Primitive codec
// ---------------------------------------------------------------------------

/// Encodes a single base value into a bit string of the requested size.
pub fn encode_segment(value: &Value, opts: &SegmentOpts) -> Result<BitString, CodecError> {
    match opts.kind {
        SegmentKind::Integer => {
            let size = opts.size.unwrap_or(8);
            if size > 64 {
                return Err(CodecError::InvalidSize(format!(
                    "integer size {} exceeds 64 bits",
                    size
                )));
            }
            let raw = match value {
                Value::Uint(u) => *u,
                Value::Int(i) => *i as u64,
                other => {
                    return Err(CodecError::TypeMismatch(format!(
                        "expected an integer, got {:?}",
                        other
                    )))
                }
            };
            let mut out = BitString::new();
            push_int(&mut out, raw, size, opts.endian);
            Ok(out)
        }
        SegmentKind::Float => {
            let size = opts.size.unwrap_or(64);
            let f = value.as_f64().ok_or_else(|| {
                CodecError::TypeMismatch(format!("expected a float, got {:?}", value))
            })?;
            encode_float(f, size, opts.endian)
        }
        SegmentKind::Bytes => {
            let bytes = value.as_bytes().ok_or_else(|| {
                CodecError::TypeMismatch(format!("expected bytes, got {:?}", value))
            })?;
            Ok(BitString::from_bytes(bytes.to_vec()))
        }
        SegmentKind::Bits => {
            let bits = value.as_bits().ok_or_else(|| {
                CodecError::TypeMismatch(format!("expected bits, got {:?}", value))
            })?;
            Ok(bits.clone())
        }
        SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32 => {
            encode_utf(value, opts.kind, opts.endian)
        }
    }
}

/// Decodes one base value from the front of `bits`, returning the value and
/// the unconsumed suffix.
pub fn decode_segment(
    bits: &BitString,
    opts: &SegmentOpts,
) -> Result<(Value, BitString), CodecError> {
    let mut reader = bits.reader();
    match opts.kind {
        SegmentKind::Integer => {
            let size = opts.size.unwrap_or(8);
            if size > 64 {
                return Err(CodecError::InvalidSize(format!(
                    "integer size {} exceeds 64 bits",
                    size
                )));
            }
            let raw = read_int(&mut reader, size, opts.endian)?;
            let value = match opts.sign {
                Sign::Signed => Value::Int(sign_extend(raw, size)),
                Sign::Unsigned => Value::Uint(raw),
            };
            Ok((value, reader.rest()))
        }
        SegmentKind::Float => {
            let size = opts.size.unwrap_or(64);
            let value = decode_float(&mut reader, size, opts.endian)?;
            Ok((Value::Float(value), reader.rest()))
        }
        SegmentKind::Bytes => {
            let needed = match opts.size {
                Some(n) => n * 8,
                None => {
                    if !bits.is_binary() {
                        return Err(CodecError::InvalidSize(format!(
                            "{} bits is not a whole number of bytes",
                            bits.len()
                        )));
                    }
                    bits.len()
                }
            };
            let window = reader
                .take(needed)
                .ok_or_else(|| CodecError::underflow(needed, bits.len()))?;
            let bytes = window.as_bytes().map(|b| b.to_vec()).unwrap_or_default();
            Ok((Value::Bytes(bytes), reader.rest()))
        }
        SegmentKind::Bits => {
            let needed = opts.size.unwrap_or(bits.len());
            let window = reader
                .take(needed)
                .ok_or_else(|| CodecError::underflow(needed, bits.len()))?;
            Ok((Value::Bits(window), reader.rest()))
        }
        SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32 => {
            if opts.text {
                let text = decode_utf_text(bits, opts.kind, opts.endian)?;
                Ok((Value::Str(text), BitString::new()))
            } else {
                let cp = decode_utf_codepoint(&mut reader, opts.kind, opts.endian)?;
                Ok((Value::Uint(cp as u64), reader.rest()))
            }
        }
    }
}

fn push_int(out: &mut BitString, raw: u64, size: usize, endian: Endian) {
    let raw = mask_to(raw, size);
    match endian {
        Endian::Big => out.push_bits(raw, size),
        Endian::Little => {
            // Whole low bytes first, then the remaining high fragment.
            let whole = size / 8;
            let frag = size % 8;
            for i in 0..whole {
                out.push_bits((raw >> (8 * i)) & 0xFF, 8);
            }
            if frag > 0 {
                out.push_bits(raw >> (8 * whole), frag);
            }
        }
    }
}

fn read_int(reader: &mut BitReader<'_>, size: usize, endian: Endian) -> Result<u64, CodecError> {
    if reader.remaining() < size {
        return Err(CodecError::underflow(size, reader.remaining()));
    }
    match endian {
        Endian::Big => Ok(reader.take_bits(size).unwrap_or(0)),
        Endian::Little => {
            let whole = size / 8;
            let frag = size % 8;
            let mut value = 0u64;
            for i in 0..whole {
                let byte = reader.take_bits(8).unwrap_or(0);
                value |= byte << (8 * i);
            }
            if frag > 0 {
                let high = reader.take_bits(frag).unwrap_or(0);
                value |= high << (8 * whole);
            }
            Ok(value)
        }
    }
}

fn mask_to(raw: u64, size: usize) -> u64 {
    if size >= 64 {
        raw
    } else if size == 0 {
        0
    } else {
        raw & ((1u64 << size) - 1)
    }
}

fn encode_float(f: f64, size: usize, endian: Endian) -> Result<BitString, CodecError> {
    let mut buf = [0u8; 8];
    let bytes: &[u8] = match (size, endian) {
        (16, Endian::Big) => {
            BigEndian::write_u16(&mut buf, f32_to_f16_bits(f as f32));
            &buf[..2]
        }
        (16, Endian::Little) => {
            LittleEndian::write_u16(&mut buf, f32_to_f16_bits(f as f32));
            &buf[..2]
        }
        (32, Endian::Big) => {
            BigEndian::write_f32(&mut buf, f as f32);
            &buf[..4]
        }
        (32, Endian::Little) => {
            LittleEndian::write_f32(&mut buf, f as f32);
            &buf[..4]
        }
        (64, Endian::Big) => {
            BigEndian::write_f64(&mut buf, f);
            &buf[..8]
        }
        (64, Endian::Little) => {
            LittleEndian::write_f64(&mut buf, f);
            &buf[..8]
        }
        _ => {
            return Err(CodecError::InvalidSize(format!(
                "float size must be 16, 32, or 64 bits, got {}",
                size
            )))
        }
    };
    Ok(BitString::from_bytes(bytes.to_vec()))
}

fn decode_float(
    reader: &mut BitReader<'_>,
    size: usize,
    endian: Endian,
) -> Result<f64, CodecError> {
    if !matches!(size, 16 | 32 | 64) {
        return Err(CodecError::InvalidSize(format!(
            "float size must be 16, 32, or 64 bits, got {}",
            size
        )));
    }
    if reader.remaining() < size {
        return Err(CodecError::underflow(size, reader.remaining()));
    }
    let mut buf = [0u8; 8];
    for slot in buf.iter_mut().take(size / 8) {
        *slot = reader.take_bits(8).unwrap_or(0) as u8;
    }
    Ok(match (size, endian) {
        (16, Endian::Big) => f16_bits_to_f32(BigEndian::read_u16(&buf)) as f64,
        (16, Endian::Little) => f16_bits_to_f32(LittleEndian::read_u16(&buf)) as f64,
        (32, Endian::Big) => BigEndian::read_f32(&buf) as f64,
        (32, Endian::Little) => LittleEndian::read_f32(&buf) as f64,
        (64, Endian::Big) => BigEndian::read_f64(&buf),
        _ => LittleEndian::read_f64(&buf),
    })
}

/// Narrows an f32 to IEEE-754 binary16 bits, round-to-nearest-even.
fn f32_to_f16_bits(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp32 = (bits >> 23) & 0xFF;
    let man = bits & 0x007F_FFFF;

    if exp32 == 0xFF {
        let payload = if man == 0 { 0 } else { 0x0200 };
        return sign | 0x7C00 | payload;
    }
    let exp = exp32 as i32 - 127 + 15;
    if exp >= 0x1F {
        return sign | 0x7C00;
    }
    if exp <= 0 {
        if exp < -10 {
            return sign;
        }
        let man = man | 0x0080_0000;
        let shift = (14 - exp) as u32;
        let mut half = (man >> shift) as u16;
        let round = 1u32 << (shift - 1);
        if (man & round) != 0 && (man & (3 * round - 1)) != 0 {
            half += 1;
        }
        return sign | half;
    }
    let mut out = sign | ((exp as u16) << 10) | ((man >> 13) as u16);
    let round = 0x1000u32;
    if (man & round) != 0 && (man & (3 * round - 1)) != 0 {
        out += 1;
    }
    out
}

/// Widens IEEE-754 binary16 bits to an f32 (exact).
fn f16_bits_to_f32(bits: u16) -> f32 {
    let sign = ((bits & 0x8000) as u32) << 16;
    let exp = (bits >> 10) & 0x1F;
    let man = (bits & 0x03FF) as u32;
    let out = match (exp, man) {
        (0, 0) => sign,
        (0, _) => {
            let mut exp = 113u32;
            let mut man = man;
            while man & 0x0400 == 0 {
                man <<= 1;
                exp -= 1;
            }
            sign | (exp << 23) | ((man & 0x03FF) << 13)
        }
        (0x1F, 0) => sign | 0x7F80_0000,
        (0x1F, _) => sign | 0x7F80_0000 | (man << 13),
        _ => sign | ((exp as u32 + 127 - 15) << 23) | (man << 13),
    };
    f32::from_bits(out)
}

fn encode_utf(value: &Value, kind: SegmentKind, endian: Endian) -> Result<BitString, CodecError> {
    match value {
        Value::Uint(_) | Value::Int(_) => {
            let cp = value
                .as_u64()
                .and_then(|u| u32::try_from(u).ok())
                .and_then(char::from_u32)
                .ok_or_else(|| {
                    CodecError::TypeMismatch(format!("{:?} is not a valid codepoint", value))
                })?;
            Ok(encode_char(cp, kind, endian))
        }
        Value::Str(s) => {
            let mut out = BitString::new();
            match kind {
                SegmentKind::Utf8 => out.extend(&BitString::from_bytes(s.as_bytes().to_vec())),
                _ => {
                    for c in s.chars() {
                        out.extend(&encode_char(c, kind, endian));
                    }
                }
            }
            Ok(out)
        }
        other => Err(CodecError::TypeMismatch(format!(
            "expected a codepoint or string, got {:?}",
            other
        ))),
    }
}

fn encode_char(c: char, kind: SegmentKind, endian: Endian) -> BitString {
    let mut bytes = Vec::new();
    match kind {
        SegmentKind::Utf8 => {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        SegmentKind::Utf16 => {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let mut b = [0u8; 2];
                match endian {
                    Endian::Big => BigEndian::write_u16(&mut b, *unit),
                    Endian::Little => LittleEndian::write_u16(&mut b, *unit),
                }
                bytes.extend_from_slice(&b);
            }
        }
        _ => {
            let mut b = [0u8; 4];
            match endian {
                Endian::Big => BigEndian::write_u32(&mut b, c as u32),
                Endian::Little => LittleEndian::write_u32(&mut b, c as u32),
            }
            bytes.extend_from_slice(&b);
        }
    }
    BitString::from_bytes(bytes)
}

fn decode_utf_codepoint(
    reader: &mut BitReader<'_>,
    kind: SegmentKind,
    endian: Endian,
) -> Result<char, CodecError> {
    match kind {
        SegmentKind::Utf8 => {
            let b0 = take_byte(reader)?;
            let len = match b0 {
                0x00..=0x7F => 1,
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                _ => {
                    return Err(CodecError::TypeMismatch(format!(
                        "invalid utf8 leading byte 0x{:02x}",
                        b0
                    )))
                }
            };
            let mut buf = vec![b0];
            for _ in 1..len {
                buf.push(take_byte(reader)?);
            }
            let s = std::str::from_utf8(&buf)
                .map_err(|_| CodecError::TypeMismatch("invalid utf8 sequence".to_string()))?;
            s.chars()
                .next()
                .ok_or_else(|| CodecError::TypeMismatch("empty utf8 sequence".to_string()))
        }
        SegmentKind::Utf16 => {
            let u0 = take_u16(reader, endian)?;
            let cp = match u0 {
                0xD800..=0xDBFF => {
                    let u1 = take_u16(reader, endian)?;
                    if !(0xDC00..=0xDFFF).contains(&u1) {
                        return Err(CodecError::TypeMismatch(
                            "unpaired utf16 high surrogate".to_string(),
                        ));
                    }
                    0x10000 + (((u0 as u32 - 0xD800) << 10) | (u1 as u32 - 0xDC00))
                }
                0xDC00..=0xDFFF => {
                    return Err(CodecError::TypeMismatch(
                        "unpaired utf16 low surrogate".to_string(),
                    ))
                }
                _ => u0 as u32,
            };
            char::from_u32(cp)
                .ok_or_else(|| CodecError::TypeMismatch("invalid utf16 codepoint".to_string()))
        }
        _ => {
            let u = take_u32(reader, endian)?;
            char::from_u32(u).ok_or_else(|| {
                CodecError::TypeMismatch(format!("0x{:x} is not a valid codepoint", u))
            })
        }
    }
}

fn decode_utf_text(
    bits: &BitString,
    kind: SegmentKind,
    endian: Endian,
) -> Result<String, CodecError> {
    let unit = match kind {
        SegmentKind::Utf8 => 8,
        SegmentKind::Utf16 => 16,
        _ => 32,
    };
    if bits.len() % unit != 0 {
        return Err(CodecError::InvalidSize(format!(
            "{} bits is not a whole number of {}-bit code units",
            bits.len(),
            unit
        )));
    }
    let mut reader = bits.reader();
    match kind {
        SegmentKind::Utf8 => {
            let mut bytes = Vec::with_capacity(bits.len() / 8);
            while reader.remaining() > 0 {
                bytes.push(take_byte(&mut reader)?);
            }
            String::from_utf8(bytes)
                .map_err(|_| CodecError::TypeMismatch("invalid utf8 text".to_string()))
        }
        SegmentKind::Utf16 => {
            let mut units = Vec::with_capacity(bits.len() / 16);
            while reader.remaining() > 0 {
                units.push(take_u16(&mut reader, endian)?);
            }
            String::from_utf16(&units)
                .map_err(|_| CodecError::TypeMismatch("invalid utf16 text".to_string()))
        }
        _ => {
            let mut out = String::new();
            while reader.remaining() > 0 {
                let u = take_u32(&mut reader, endian)?;
                out.push(char::from_u32(u).ok_or_else(|| {
                    CodecError::TypeMismatch(format!("0x{:x} is not a valid codepoint", u))
                })?);
            }
            Ok(out)
        }
    }
}

fn take_byte(reader: &mut BitReader<'_>) -> Result<u8, CodecError> {
    reader
        .take_bits(8)
        .map(|b| b as u8)
        .ok_or_else(|| CodecError::underflow(8, reader.remaining()))
}

fn take_u16(reader: &mut BitReader<'_>, endian: Endian) -> Result<u16, CodecError> {
    let buf = [take_byte(reader)?, take_byte(reader)?];
    Ok(match endian {
        Endian::Big => BigEndian::read_u16(&buf),
        Endian::Little => LittleEndian::read_u16(&buf),
    })
}

fn take_u32(reader: &mut BitReader<'_>, endian: Endian) -> Result<u32, CodecError> {
    let buf = [
        take_byte(reader)?,
        take_byte(reader)?,
        take_byte(reader)?,
        take_byte(reader)?,
    ];
    Ok(match endian {
        Endian::Big => BigEndian::read_u32(&buf),
        Endian::Little => LittleEndian::read_u32(&buf),
    })
}

// ---------------------------------------------------------------------------
// Array codec
// ---------------------------------------------------------------------------

fn elem_opts(kind: SegmentKind, element_size: usize, sign: Sign, endian: Endian) -> Result<SegmentOpts, CodecError> {
    let size = match kind {
        SegmentKind::Bytes => {
            if element_size % 8 != 0 {
                return Err(CodecError::InvalidSize(format!(
                    "byte element size {} is not a whole number of bytes",
                    element_size
                )));
            }
            element_size / 8
        }
        _ => element_size,
    };
    Ok(SegmentOpts {
        size: Some(size),
        kind,
        sign,
        endian,
        text: false,
    })
}

fn encode_array(
    elements: &[Value],
    kind: SegmentKind,
    element_size: usize,
    sign: Sign,
    endian: Endian,
) -> Result<BitString, CodecError> {
    let opts = elem_opts(kind, element_size, sign, endian)?;
    let mut out = BitString::new();
    for element in elements {
        out.extend(&encode_segment(element, &opts)?);
    }
    Ok(out)
}

fn decode_array(
    window: &BitString,
    kind: SegmentKind,
    element_size: usize,
    sign: Sign,
    endian: Endian,
) -> Result<Vec<Value>, CodecError> {
    if element_size == 0 {
        return Err(CodecError::InvalidSize(
            "array element size must be nonzero".to_string(),
        ));
    }
    if window.len() % element_size != 0 {
        return Err(CodecError::InvalidSize(format!(
            "array size {} is not a multiple of element size {}",
            window.len(),
            element_size
        )));
    }
    let opts = elem_opts(kind, element_size, sign, endian)?;
    let count = window.len() / element_size;
    let mut elements = Vec::with_capacity(count);
    let mut rest = window.clone();
    for _ in 0..count {
        let (value, next) = decode_segment(&rest, &opts)?;
        elements.push(value);
        rest = next;
    }
    Ok(elements)
}

// ---------------------------------------------------------------------------
// Block codec
// ---------------------------------------------------------------------------

/// Supplies the wire size of each dynamic segment at decode time.
///
/// `resolve` is invoked strictly in the declaration order of the dynamic
/// segments, after all earlier segments have been decoded into `record`.
/// The returned size is in **bits**; the accumulator threads user state
/// across invocations. Implemented for any
/// `FnMut(&Record, &str, Acc) -> Result<(usize, Acc), CodecError>`.
pub trait SizeResolver<Acc> {
    fn resolve(
        &mut self,
        record: &Record,
        segment: &str,
        acc: Acc,
    ) -> Result<(usize, Acc), CodecError>;
}

impl<Acc, F> SizeResolver<Acc> for F
where
    F: FnMut(&Record, &str, Acc) -> Result<(usize, Acc), CodecError>,
{
    fn resolve(
        &mut self,
        record: &Record,
        segment: &str,
        acc: Acc,
    ) -> Result<(usize, Acc), CodecError> {
        self(record, segment, acc)
    }
}

impl Block {
    /// Encodes `record` into a bit string, concatenating per-segment
    /// encodings in wire order. The `leftover` field is never inspected.
    pub fn encode(&self, record: &Record) -> Result<BitString, CodecError> {
        let mut out = BitString::new();
        for seg in &self.segments {
            match seg.size {
                SegmentSize::Skip => {}
                SegmentSize::Fixed(n) => {
                    let value = record.get(&seg.name).ok_or_else(|| {
                        CodecError::TypeMismatch(format!("segment `{}`: missing field", seg.name))
                    })?;
                    let opts = SegmentOpts::for_segment(seg, Some(n));
                    out.extend(&encode_segment(value, &opts).map_err(|e| e.at(&seg.name))?);
                }
                SegmentSize::Dynamic => {
                    let value = record.get(&seg.name).unwrap_or(&Value::Nil);
                    match value {
                        Value::Nil => {}
                        Value::Dynamic(env) => {
                            out.extend(
                                &self
                                    .encode_dynamic_value(seg, &env.value, env.size_bits)
                                    .map_err(|e| e.at(&seg.name))?,
                            );
                        }
                        other => {
                            return Err(CodecError::TypeMismatch(format!(
                                "segment `{}`: expected a dynamic envelope or nil, got {:?}",
                                seg.name, other
                            )))
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    fn encode_dynamic_value(
        &self,
        seg: &Segment,
        value: &Value,
        size_bits: usize,
    ) -> Result<BitString, CodecError> {
        match &seg.ty {
            SegmentType::Array { kind, element_size } => {
                let elements = value.as_list().ok_or_else(|| {
                    CodecError::TypeMismatch(format!("expected a list, got {:?}", value))
                })?;
                encode_array(elements, *kind, *element_size, seg.sign, seg.endian)
            }
            SegmentType::Scalar(kind) => {
                let size = match kind {
                    SegmentKind::Bytes => size_bits / 8,
                    _ => size_bits,
                };
                let opts = SegmentOpts {
                    size: Some(size),
                    kind: *kind,
                    sign: seg.sign,
                    endian: seg.endian,
                    text: false,
                };
                encode_segment(value, &opts)
            }
        }
    }

    /// Static-form decode, valid only for blocks without dynamic segments.
    ///
    /// Extracts each fixed segment in order and places the unconsumed suffix
    /// into the record's `leftover`.
    pub fn decode(&self, bits: &BitString) -> Result<Record, CodecError> {
        if self.is_dynamic() {
            return Err(CodecError::TypeMismatch(format!(
                "block `{}` has dynamic segments and needs a resolver",
                self.name
            )));
        }
        self.decode_static_prefix(bits)
    }

    /// Dynamic-form decode: the fixed prefix is extracted as in [Block::decode],
    /// then each dynamic segment's size is supplied by `resolver`, which sees
    /// every intermediate record state and threads `acc` in declaration order.
    pub fn decode_dynamic<Acc, R: SizeResolver<Acc>>(
        &self,
        bits: &BitString,
        acc: Acc,
        resolver: &mut R,
    ) -> Result<Record, CodecError> {
        let mut record = self.decode_static_prefix(bits)?;
        let mut acc = acc;
        for &i in &self.dynamic {
            let seg = &self.segments[i];
            let (size_bits, next_acc) = resolver.resolve(&record, &seg.name, acc)?;
            acc = next_acc;
            let (value, rest) = self.decode_dynamic_value(seg, &record.leftover, size_bits)?;
            let consumed = record.leftover.len() - rest.len();
            record.set(seg.name.clone(), Value::dynamic(value, consumed));
            record.leftover = rest;
        }
        Ok(record)
    }

    fn decode_static_prefix(&self, bits: &BitString) -> Result<Record, CodecError> {
        let mut record = self.record();
        let mut reader = bits.reader();
        for seg in &self.segments {
            let native = match seg.size {
                SegmentSize::Fixed(n) => n,
                SegmentSize::Skip => continue,
                SegmentSize::Dynamic => break,
            };
            let n_bits = seg.fixed_bits().unwrap_or(0);
            let window = reader
                .take(n_bits)
                .ok_or_else(|| CodecError::underflow(n_bits, reader.remaining()))?;
            let opts = SegmentOpts::for_segment(seg, Some(native));
            let (value, _) = decode_segment(&window, &opts).map_err(|e| e.at(&seg.name))?;
            record.set(seg.name.clone(), value);
        }
        record.leftover = reader.rest();
        Ok(record)
    }

    fn decode_dynamic_value(
        &self,
        seg: &Segment,
        leftover: &BitString,
        size_bits: usize,
    ) -> Result<(Value, BitString), CodecError> {
        match &seg.ty {
            SegmentType::Array { kind, element_size } => {
                let mut reader = leftover.reader();
                let window = reader
                    .take(size_bits)
                    .ok_or_else(|| CodecError::underflow(size_bits, leftover.len()))?;
                let elements = decode_array(&window, *kind, *element_size, seg.sign, seg.endian)
                    .map_err(|e| e.at(&seg.name))?;
                Ok((Value::List(elements), reader.rest()))
            }
            SegmentType::Scalar(kind) => match kind {
                SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32 => {
                    // Utf consumption is value-driven: one codepoint, or the
                    // entire remainder in text mode.
                    if size_bits == 0 {
                        let empty = if matches!(seg.default, Value::Str(_)) {
                            Value::Str(String::new())
                        } else {
                            Value::Nil
                        };
                        return Ok((empty, leftover.clone()));
                    }
                    let opts = SegmentOpts::for_segment(seg, None);
                    decode_segment(leftover, &opts).map_err(|e| e.at(&seg.name))
                }
                SegmentKind::Bytes => {
                    if size_bits % 8 != 0 {
                        return Err(CodecError::InvalidSize(format!(
                            "segment `{}`: resolved size {} bits is not a whole number of bytes",
                            seg.name, size_bits
                        )));
                    }
                    let opts = SegmentOpts::for_segment(seg, Some(size_bits / 8));
                    decode_segment(leftover, &opts).map_err(|e| e.at(&seg.name))
                }
                _ => {
                    let opts = SegmentOpts::for_segment(seg, Some(size_bits));
                    decode_segment(leftover, &opts).map_err(|e| e.at(&seg.name))
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitString;

    fn int_opts(size: usize, sign: Sign, endian: Endian) -> SegmentOpts {
        SegmentOpts {
            size: Some(size),
            sign,
            endian,
            ..Default::default()
        }
    }

    #[test]
    fn signed_nibble_two_complement() {
        let out = encode_segment(
            &Value::Int(-3),
            &int_opts(4, Sign::Signed, Endian::Big),
        )
        .unwrap();
        assert_eq!(out.len(), 4);
        let mut r = out.reader();
        assert_eq!(r.take_bits(4), Some(0b1101));

        let (value, rest) =
            decode_segment(&out, &int_opts(4, Sign::Signed, Endian::Big)).unwrap();
        assert_eq!(value, Value::Int(-3));
        assert!(rest.is_empty());
    }

    #[test]
    fn little_endian_12_bits_low_byte_first() {
        let out = encode_segment(
            &Value::Uint(0xABC),
            &int_opts(12, Sign::Unsigned, Endian::Little),
        )
        .unwrap();
        assert_eq!(out.len(), 12);
        let mut r = out.reader();
        assert_eq!(r.take_bits(8), Some(0xBC));
        assert_eq!(r.take_bits(4), Some(0xA));

        let (value, _) =
            decode_segment(&out, &int_opts(12, Sign::Unsigned, Endian::Little)).unwrap();
        assert_eq!(value, Value::Uint(0xABC));
    }

    #[test]
    fn integer_truncates_to_declared_width() {
        let out = encode_segment(
            &Value::Uint(0x1FF),
            &int_opts(8, Sign::Unsigned, Endian::Big),
        )
        .unwrap();
        let (value, _) = decode_segment(&out, &int_opts(8, Sign::Unsigned, Endian::Big)).unwrap();
        assert_eq!(value, Value::Uint(0xFF));
    }

    #[test]
    fn integer_default_size_is_8() {
        let out = encode_segment(&Value::Uint(7), &SegmentOpts::default()).unwrap();
        assert_eq!(out.len(), 8);
    }

    #[test]
    fn integer_over_64_bits_rejected() {
        let err = encode_segment(
            &Value::Uint(1),
            &int_opts(65, Sign::Unsigned, Endian::Big),
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidSize(_)));
    }

    #[test]
    fn float_roundtrips_all_widths() {
        for &size in &[16usize, 32, 64] {
            for &endian in &[Endian::Big, Endian::Little] {
                let opts = SegmentOpts {
                    size: Some(size),
                    kind: SegmentKind::Float,
                    endian,
                    ..Default::default()
                };
                let out = encode_segment(&Value::Float(-2.5), &opts).unwrap();
                assert_eq!(out.len(), size);
                let (value, rest) = decode_segment(&out, &opts).unwrap();
                assert_eq!(value, Value::Float(-2.5));
                assert!(rest.is_empty());
            }
        }
    }

    #[test]
    fn float_width_checked() {
        let opts = SegmentOpts {
            size: Some(24),
            kind: SegmentKind::Float,
            ..Default::default()
        };
        assert!(matches!(
            encode_segment(&Value::Float(1.0), &opts).unwrap_err(),
            CodecError::InvalidSize(_)
        ));
    }

    #[test]
    fn f16_special_values() {
        assert_eq!(f32_to_f16_bits(0.0), 0x0000);
        assert_eq!(f32_to_f16_bits(1.0), 0x3C00);
        assert_eq!(f32_to_f16_bits(-2.0), 0xC000);
        assert_eq!(f32_to_f16_bits(f32::INFINITY), 0x7C00);
        assert_eq!(f16_bits_to_f32(0x3C00), 1.0);
        assert_eq!(f16_bits_to_f32(0xC000), -2.0);
        // subnormal: smallest positive half
        assert_eq!(f16_bits_to_f32(0x0001), 2.0f32.powi(-24));
    }

    #[test]
    fn bytes_decode_counts_bytes() {
        let input = BitString::from_bytes(b"begin-rest".to_vec());
        let opts = SegmentOpts {
            size: Some(5),
            kind: SegmentKind::Bytes,
            ..Default::default()
        };
        let (value, rest) = decode_segment(&input, &opts).unwrap();
        assert_eq!(value, Value::Bytes(b"begin".to_vec()));
        assert_eq!(rest.len(), 40);
    }

    #[test]
    fn bytes_encode_size_is_advisory() {
        let opts = SegmentOpts {
            size: Some(2),
            kind: SegmentKind::Bytes,
            ..Default::default()
        };
        let out = encode_segment(&Value::Bytes(b"begin".to_vec()), &opts).unwrap();
        assert_eq!(out.len(), 40);
    }

    #[test]
    fn bits_decode_counts_bits() {
        let mut input = BitString::new();
        input.push_bits(0b1011_01, 6);
        let opts = SegmentOpts {
            size: Some(4),
            kind: SegmentKind::Bits,
            ..Default::default()
        };
        let (value, rest) = decode_segment(&input, &opts).unwrap();
        let taken = value.as_bits().unwrap();
        assert_eq!(taken.len(), 4);
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn utf8_codepoint_roundtrip() {
        let opts = SegmentOpts {
            kind: SegmentKind::Utf8,
            ..Default::default()
        };
        let out = encode_segment(&Value::Uint('é' as u64), &opts).unwrap();
        assert_eq!(out.len(), 16);
        let (value, rest) = decode_segment(&out, &opts).unwrap();
        assert_eq!(value, Value::Uint('é' as u64));
        assert!(rest.is_empty());
    }

    #[test]
    fn utf8_codepoint_leaves_remainder() {
        let mut input = encode_segment(
            &Value::Uint('A' as u64),
            &SegmentOpts {
                kind: SegmentKind::Utf8,
                ..Default::default()
            },
        )
        .unwrap();
        input.extend(&BitString::from_bytes(vec![0xFF]));
        let (value, rest) = decode_segment(
            &input,
            &SegmentOpts {
                kind: SegmentKind::Utf8,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(value, Value::Uint('A' as u64));
        assert_eq!(rest.len(), 8);
    }

    #[test]
    fn utf_text_consumes_everything() {
        for kind in [SegmentKind::Utf8, SegmentKind::Utf16, SegmentKind::Utf32] {
            for endian in [Endian::Big, Endian::Little] {
                let opts = SegmentOpts {
                    kind,
                    endian,
                    text: true,
                    ..Default::default()
                };
                let out = encode_segment(&Value::Str("héllo 🚀".into()), &opts).unwrap();
                let (value, rest) = decode_segment(&out, &opts).unwrap();
                assert_eq!(value, Value::Str("héllo 🚀".into()));
                assert!(rest.is_empty());
            }
        }
    }

    #[test]
    fn utf16_surrogate_pair_codepoint() {
        let opts = SegmentOpts {
            kind: SegmentKind::Utf16,
            ..Default::default()
        };
        let out = encode_segment(&Value::Uint('🚀' as u64), &opts).unwrap();
        assert_eq!(out.len(), 32);
        let (value, rest) = decode_segment(&out, &opts).unwrap();
        assert_eq!(value, Value::Uint('🚀' as u64));
        assert!(rest.is_empty());
    }

    #[test]
    fn array_signed_nibbles() {
        let list: Vec<Value> = [1i64, -1, 2, -2].iter().map(|&i| Value::Int(i)).collect();
        let out = encode_array(&list, SegmentKind::Integer, 4, Sign::Signed, Endian::Big).unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out.as_bytes(), Some(&[0b0001_1111, 0b0010_1110][..]));

        let decoded =
            decode_array(&out, SegmentKind::Integer, 4, Sign::Signed, Endian::Big).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn array_empty_window() {
        let decoded = decode_array(
            &BitString::new(),
            SegmentKind::Integer,
            4,
            Sign::Unsigned,
            Endian::Big,
        )
        .unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn array_indivisible_size_rejected() {
        let mut window = BitString::new();
        window.push_bits(0, 10);
        let err = decode_array(&window, SegmentKind::Integer, 4, Sign::Unsigned, Endian::Big)
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidSize(_)));
    }

    #[test]
    fn underflow_reports_counts() {
        let input = BitString::from_bytes(vec![0xAB]);
        let err = decode_segment(&input, &int_opts(12, Sign::Unsigned, Endian::Big)).unwrap_err();
        assert_eq!(
            err,
            CodecError::SizeUnderflow {
                needed: 12,
                available: 8
            }
        );
    }
}
