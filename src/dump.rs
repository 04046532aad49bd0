//! Format records and block descriptors for display.

use crate::block::{Block, Endian, SegmentKind, SegmentSize, SegmentType, Sign};
use crate::value::Value;

fn hex_string(b: &[u8]) -> String {
    b.iter()
        .map(|x| format!("{:02x}", x))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One-line rendering of a value: decimal scalars, hex bytes, binary bit
/// tails, dynamic envelopes with their wire size.
pub fn value_to_string(v: &Value) -> String {
    match v {
        Value::Int(x) => format!("{}", x),
        Value::Uint(x) => format!("{}", x),
        Value::Float(x) => format!("{}", x),
        Value::Str(s) => format!("{:?}", s),
        Value::Bytes(b) => format!("hex({})", hex_string(b)),
        Value::Bits(b) => format!("{}", b),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(value_to_string).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Dynamic(d) => format!("{} @ {} bits", value_to_string(&d.value), d.size_bits),
        Value::Nil => "nil".to_string(),
    }
}

/// Renders a record against its block: one line per declared segment in
/// wire order, plus the leftover when any bits remain.
pub fn record_to_string(block: &Block, record: &crate::value::Record) -> String {
    let mut lines = vec![format!("{} {{", block.name())];
    for name in block.segments() {
        let rendered = record
            .get(name)
            .map(value_to_string)
            .unwrap_or_else(|| "nil".to_string());
        lines.push(format!("  {}: {}", name, rendered));
    }
    if !record.leftover.is_empty() {
        lines.push(format!("  leftover: {}", record.leftover));
    }
    lines.push("}".to_string());
    lines.join("\n")
}

fn kind_name(kind: SegmentKind, sign: Sign) -> &'static str {
    match kind {
        SegmentKind::Integer => match sign {
            Sign::Signed => "int",
            Sign::Unsigned => "uint",
        },
        SegmentKind::Float => "float",
        SegmentKind::Bits => "bits",
        SegmentKind::Bytes => "bytes",
        SegmentKind::Utf8 => "utf8",
        SegmentKind::Utf16 => "utf16",
        SegmentKind::Utf32 => "utf32",
    }
}

/// Renders a block descriptor as a DSL-like listing.
pub fn block_to_string(block: &Block) -> String {
    let mut lines = vec![format!("block {} {{", block.name())];
    for name in block.segments() {
        let seg = match block.segment_info(name) {
            Some(s) => s,
            None => continue,
        };
        let kind = kind_name(seg.ty.kind(), seg.sign);
        let decl = match (&seg.ty, seg.size) {
            (SegmentType::Array { element_size, .. }, _) => {
                format!("array<{}({})>", kind, element_size)
            }
            (_, SegmentSize::Fixed(n)) => format!("{}({})", kind, n),
            (_, SegmentSize::Dynamic) => format!("dynamic {}", kind),
            (_, SegmentSize::Skip) => format!("skip {}", kind),
        };
        let endian = match seg.endian {
            Endian::Little => " little",
            Endian::Big => "",
        };
        let default = match &seg.default {
            Value::Nil => String::new(),
            v => format!(" = {}", value_to_string(v)),
        };
        lines.push(format!("  {}: {}{}{};", name, decl, endian, default));
    }
    lines.push("}".to_string());
    lines.join("\n")
}
