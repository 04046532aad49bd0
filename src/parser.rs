//! Parse block declarations into [Block] descriptors using PEST.
//!
//! The DSL is a thin declaration layer over the builder: every field
//! desugars to one `segment`/`array` call, and the same build-time
//! validation applies to both routes.

use crate::block::{
    ArrayOptions, Block, Endian, SegmentKind, SegmentOptions, SegmentSize, Sign,
};
use crate::value::Value;
use pest::Parser;
use pest_derive::Parser as PestParser;

#[derive(PestParser)]
#[grammar = "grammar.pest"]
struct BlockParser;

/// Parse block-declaration source into descriptors, one per `block`.
pub fn parse(source: &str) -> Result<Vec<Block>, String> {
    let pairs = BlockParser::parse(Rule::schema, source)
        .map_err(|e| format!("Parse error: {}", e))?;
    let schema = pairs.into_iter().next().ok_or("Empty parse")?;

    let mut blocks = Vec::new();
    for inner in schema.into_inner() {
        if matches!(inner.as_rule(), Rule::block_def) {
            blocks.push(build_block(inner)?);
        }
    }
    Ok(blocks)
}

enum TypeDecl {
    Scalar {
        size: SegmentSize,
        kind: SegmentKind,
        sign: Sign,
        endian: Endian,
    },
    Array {
        kind: SegmentKind,
        element_size: usize,
        sign: Sign,
        endian: Endian,
    },
}

enum Literal {
    Int(i64),
    Float(f64),
    Hex(String),
    Str(String),
}

fn build_block(pair: pest::iterators::Pair<Rule>) -> Result<Block, String> {
    let mut name = String::new();
    let mut builder = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => {
                name = inner.as_str().to_string();
                builder = Some(Block::builder(name.clone()));
            }
            Rule::segment_decl => {
                let b = builder.take().ok_or("Block name missing")?;
                builder = Some(build_segment(b, inner)?);
            }
            _ => {}
        }
    }

    builder
        .ok_or("Empty block definition")?
        .build()
        .map_err(|e| format!("block `{}`: {}", name, e))
}

fn build_segment(
    builder: crate::block::BlockBuilder,
    pair: pest::iterators::Pair<Rule>,
) -> Result<crate::block::BlockBuilder, String> {
    let mut name = String::new();
    let mut decl = None;
    let mut default = None;

    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::ident => name = inner.as_str().to_string(),
            Rule::type_spec => decl = Some(build_type_spec(inner)?),
            Rule::default_clause => {
                let lit = inner.into_inner().next().ok_or("Missing default literal")?;
                default = Some(parse_literal(lit.as_str())?);
            }
            _ => {}
        }
    }

    let decl = decl.ok_or_else(|| format!("segment `{}`: missing type", name))?;
    match decl {
        TypeDecl::Scalar {
            size,
            kind,
            sign,
            endian,
        } => {
            let default = default_value(default, kind, sign)
                .map_err(|e| format!("segment `{}`: {}", name, e))?;
            Ok(builder.segment(
                name,
                size,
                SegmentOptions {
                    kind,
                    sign,
                    endian,
                    default,
                },
            ))
        }
        TypeDecl::Array {
            kind,
            element_size,
            sign,
            endian,
        } => {
            let default = default_value(default, kind, sign)
                .map_err(|e| format!("segment `{}`: {}", name, e))?;
            Ok(builder.array(
                name,
                ArrayOptions {
                    kind,
                    element_size,
                    sign,
                    endian,
                    default,
                },
            ))
        }
    }
}

fn build_type_spec(pair: pest::iterators::Pair<Rule>) -> Result<TypeDecl, String> {
    let inner = pair.into_inner().next().ok_or("Empty type spec")?;
    match inner.as_rule() {
        Rule::sized_type => {
            let mut kind = None;
            let mut size = None;
            let mut attrs = Vec::new();
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::kind_name => kind = Some(p.as_str()),
                    Rule::num => size = Some(parse_num(p.as_str())?),
                    Rule::attr => attrs.push(p.as_str()),
                    _ => {}
                }
            }
            let (kind, sign, endian) = resolve_kind(kind.ok_or("Missing kind")?, &attrs)?;
            Ok(TypeDecl::Scalar {
                size: SegmentSize::Fixed(size.ok_or("Missing size")?),
                kind,
                sign,
                endian,
            })
        }
        Rule::dynamic_type | Rule::skip_type => {
            let is_skip = matches!(inner.as_rule(), Rule::skip_type);
            let mut kind = None;
            let mut attrs = Vec::new();
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::kind_name => kind = Some(p.as_str()),
                    Rule::attr_parens => {
                        for a in p.into_inner() {
                            attrs.push(a.as_str());
                        }
                    }
                    _ => {}
                }
            }
            let (kind, sign, endian) = resolve_kind(kind.ok_or("Missing kind")?, &attrs)?;
            Ok(TypeDecl::Scalar {
                size: if is_skip {
                    SegmentSize::Skip
                } else {
                    SegmentSize::Dynamic
                },
                kind,
                sign,
                endian,
            })
        }
        Rule::array_type => {
            let mut kind = None;
            let mut element_size = 8usize;
            let mut attrs = Vec::new();
            for p in inner.into_inner() {
                match p.as_rule() {
                    Rule::kind_name => kind = Some(p.as_str()),
                    Rule::elem_size => {
                        let n = p.into_inner().next().ok_or("Missing element size")?;
                        element_size = parse_num(n.as_str())?;
                    }
                    Rule::attr => attrs.push(p.as_str()),
                    _ => {}
                }
            }
            let (kind, sign, endian) = resolve_kind(kind.ok_or("Missing kind")?, &attrs)?;
            Ok(TypeDecl::Array {
                kind,
                element_size,
                sign,
                endian,
            })
        }
        other => Err(format!("Unhandled type rule: {:?}", other)),
    }
}

fn resolve_kind(name: &str, attrs: &[&str]) -> Result<(SegmentKind, Sign, Endian), String> {
    let (kind, mut sign) = match name {
        "uint" => (SegmentKind::Integer, Sign::Unsigned),
        "int" => (SegmentKind::Integer, Sign::Signed),
        "float" => (SegmentKind::Float, Sign::Unsigned),
        "bits" | "bitstring" => (SegmentKind::Bits, Sign::Unsigned),
        "bytes" | "binary" => (SegmentKind::Bytes, Sign::Unsigned),
        "utf8" => (SegmentKind::Utf8, Sign::Unsigned),
        "utf16" => (SegmentKind::Utf16, Sign::Unsigned),
        "utf32" => (SegmentKind::Utf32, Sign::Unsigned),
        other => return Err(format!("Unknown kind: {}", other)),
    };
    let mut endian = Endian::Big;
    for attr in attrs {
        match *attr {
            "little" => endian = Endian::Little,
            "big" => endian = Endian::Big,
            "signed" => sign = Sign::Signed,
            "unsigned" => sign = Sign::Unsigned,
            other => return Err(format!("Unknown attribute: {}", other)),
        }
    }
    Ok((kind, sign, endian))
}

fn parse_num(s: &str) -> Result<usize, String> {
    s.parse().map_err(|_| format!("Invalid number: {}", s))
}

fn parse_literal(s: &str) -> Result<Literal, String> {
    let s = s.trim();
    if s.starts_with('"') && s.ends_with('"') && s.len() >= 2 {
        let inner = &s[1..s.len() - 1];
        let unescaped = inner
            .replace("\\n", "\n")
            .replace("\\t", "\t")
            .replace("\\\"", "\"");
        return Ok(Literal::Str(unescaped));
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return Ok(Literal::Hex(hex.to_string()));
    }
    if s.contains('.') {
        return s
            .parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| format!("Invalid float literal: {}", s));
    }
    s.parse::<i64>()
        .map(Literal::Int)
        .map_err(|_| format!("Invalid literal: {}", s))
}

fn hex_bytes(digits: &str) -> Result<Vec<u8>, String> {
    if digits.len() % 2 != 0 {
        return Err("Hex literal must have an even number of digits".to_string());
    }
    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for chunk in digits.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).map_err(|_| "Invalid hex")?;
        bytes.push(u8::from_str_radix(pair, 16).map_err(|_| "Invalid hex")?);
    }
    Ok(bytes)
}

/// Converts a parsed default literal to the value shape of its segment kind.
fn default_value(lit: Option<Literal>, kind: SegmentKind, sign: Sign) -> Result<Value, String> {
    let lit = match lit {
        Some(l) => l,
        None => return Ok(Value::Nil),
    };
    match (kind, lit) {
        (SegmentKind::Integer, Literal::Int(n)) => Ok(match sign {
            Sign::Signed => Value::Int(n),
            Sign::Unsigned => {
                u64::try_from(n).map(Value::Uint).map_err(|_| {
                    format!("negative default {} for an unsigned segment", n)
                })?
            }
        }),
        (SegmentKind::Integer, Literal::Hex(h)) => u64::from_str_radix(&h, 16)
            .map(Value::Uint)
            .map_err(|_| format!("Invalid hex literal: 0x{}", h)),
        (SegmentKind::Float, Literal::Float(f)) => Ok(Value::Float(f)),
        (SegmentKind::Float, Literal::Int(n)) => Ok(Value::Float(n as f64)),
        (SegmentKind::Bytes, Literal::Str(s)) => Ok(Value::Bytes(s.into_bytes())),
        (SegmentKind::Bytes, Literal::Hex(h)) => hex_bytes(&h).map(Value::Bytes),
        (SegmentKind::Bits, Literal::Hex(h)) => {
            hex_bytes(&h).map(|b| Value::Bits(crate::bits::BitString::from_bytes(b)))
        }
        (SegmentKind::Bits, Literal::Str(s)) => Ok(Value::Bits(
            crate::bits::BitString::from_bytes(s.into_bytes()),
        )),
        (SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32, Literal::Str(s)) => {
            Ok(Value::Str(s))
        }
        (SegmentKind::Utf8 | SegmentKind::Utf16 | SegmentKind::Utf32, Literal::Int(n)) => {
            u64::try_from(n)
                .map(Value::Uint)
                .map_err(|_| format!("negative codepoint default {}", n))
        }
        (kind, _) => Err(format!("default literal does not fit kind {:?}", kind)),
    }
}
