//! DSL unit tests: syntax (parse success/failure) and the descriptors the
//! parser produces.

use bitblock::{parse, Endian, SegmentKind, SegmentSize, Sign, Value};

// ==================== Syntax: valid declarations ====================

#[test]
fn parse_empty_source() {
    let blocks = parse("").expect("empty source parses");
    assert!(blocks.is_empty());
}

#[test]
fn parse_minimal_block() {
    let blocks = parse("block m { x: uint(8); }").expect("parse");
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].name(), "m");
    assert_eq!(blocks[0].segments(), vec!["x"]);
}

#[test]
fn parse_all_kinds() {
    let src = r#"
block kinds {
    a: uint(4);
    b: int(12);
    c: float(32);
    d: bits(5);
    e: bitstring(5);
    f: bytes(2);
    g: binary(2);
    h: dynamic utf8;
    i: dynamic utf16;
    j: dynamic utf32;
}
"#;
    let blocks = parse(src).expect("parse");
    let block = &blocks[0];
    assert_eq!(block.segments().len(), 10);
    assert_eq!(block.segment_info("a").unwrap().ty.kind(), SegmentKind::Integer);
    assert_eq!(block.segment_info("b").unwrap().sign, Sign::Signed);
    assert_eq!(block.segment_info("c").unwrap().ty.kind(), SegmentKind::Float);
    assert_eq!(block.segment_info("d").unwrap().ty.kind(), SegmentKind::Bits);
    assert_eq!(block.segment_info("e").unwrap().ty.kind(), SegmentKind::Bits);
    assert_eq!(block.segment_info("f").unwrap().ty.kind(), SegmentKind::Bytes);
    assert_eq!(block.segment_info("g").unwrap().ty.kind(), SegmentKind::Bytes);
    assert_eq!(block.segment_info("h").unwrap().ty.kind(), SegmentKind::Utf8);
    assert_eq!(block.segment_info("i").unwrap().ty.kind(), SegmentKind::Utf16);
    assert_eq!(block.segment_info("j").unwrap().ty.kind(), SegmentKind::Utf32);
}

#[test]
fn parse_with_comments() {
    let src = r#"
block c {
    // line comment
    id: uint(8);
    len: uint(16); /* block comment */
    data: dynamic bytes;
}
"#;
    let blocks = parse(src).expect("parse");
    assert_eq!(blocks[0].segments().len(), 3);
}

#[test]
fn parse_attributes() {
    let src = r#"
block attrs {
    a: uint(12, little);
    b: uint(4, signed);
    c: int(8, big);
    d: dynamic uint(little);
    e: array<uint(16), little, signed>;
}
"#;
    let blocks = parse(src).expect("parse");
    let block = &blocks[0];
    assert_eq!(block.segment_info("a").unwrap().endian, Endian::Little);
    assert_eq!(block.segment_info("b").unwrap().sign, Sign::Signed);
    assert_eq!(block.segment_info("c").unwrap().endian, Endian::Big);
    assert_eq!(block.segment_info("d").unwrap().size, SegmentSize::Dynamic);
    assert_eq!(block.segment_info("d").unwrap().endian, Endian::Little);
    let e = block.segment_info("e").unwrap();
    assert_eq!(e.sign, Sign::Signed);
    assert_eq!(e.endian, Endian::Little);
}

#[test]
fn parse_array_forms() {
    let src = r#"
block arrays {
    plain: array<uint>;
    nibbles: array<int(4), signed>;
}
"#;
    let blocks = parse(src).expect("parse");
    let block = &blocks[0];
    match &block.segment_info("plain").unwrap().ty {
        bitblock::SegmentType::Array { kind, element_size } => {
            assert_eq!(*kind, SegmentKind::Integer);
            assert_eq!(*element_size, 8);
        }
        other => panic!("expected array, got {:?}", other),
    }
    match &block.segment_info("nibbles").unwrap().ty {
        bitblock::SegmentType::Array { element_size, .. } => assert_eq!(*element_size, 4),
        other => panic!("expected array, got {:?}", other),
    }
    assert_eq!(
        block.segment_info("nibbles").unwrap().size,
        SegmentSize::Dynamic
    );
}

#[test]
fn parse_defaults() {
    let src = r#"
block defaults {
    version: uint(4) = 4;
    delta: int(8) = -3;
    scale: float(32) = 1.5;
    magic: bytes(2) = 0xBEEF;
    label: bytes(5) = "begin";
    note: skip utf8 = "spare";
    cp: dynamic utf8 = 65;
}
"#;
    let blocks = parse(src).expect("parse");
    let block = &blocks[0];
    assert_eq!(block.segment_info("version").unwrap().default, Value::Uint(4));
    assert_eq!(block.segment_info("delta").unwrap().default, Value::Int(-3));
    assert_eq!(
        block.segment_info("scale").unwrap().default,
        Value::Float(1.5)
    );
    assert_eq!(
        block.segment_info("magic").unwrap().default,
        Value::Bytes(vec![0xBE, 0xEF])
    );
    assert_eq!(
        block.segment_info("label").unwrap().default,
        Value::Bytes(b"begin".to_vec())
    );
    assert_eq!(
        block.segment_info("note").unwrap().default,
        Value::Str("spare".into())
    );
    assert_eq!(block.segment_info("cp").unwrap().default, Value::Uint(65));
}

#[test]
fn parse_multiple_blocks() {
    let src = r#"
block first { x: uint(8); }
block second { y: uint(8); }
"#;
    let blocks = parse(src).expect("parse");
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].name(), "first");
    assert_eq!(blocks[1].name(), "second");
}

#[test]
fn skip_segment_parses() {
    let blocks = parse("block s { pad: skip uint = 7; }").expect("parse");
    let seg = blocks[0].segment_info("pad").unwrap();
    assert_eq!(seg.size, SegmentSize::Skip);
    assert_eq!(seg.default, Value::Uint(7));
}

// ==================== Syntax: invalid declarations ====================

#[test]
fn missing_semicolon_fails() {
    assert!(parse("block m { x: uint(8) }").is_err());
}

#[test]
fn unknown_kind_fails() {
    assert!(parse("block m { x: short(8); }").is_err());
}

#[test]
fn missing_size_on_sized_kind_fails() {
    assert!(parse("block m { x: uint; }").is_err());
}

#[test]
fn unclosed_block_fails() {
    assert!(parse("block m { x: uint(8);").is_err());
}

// ==================== Semantics: build-time validation ====================

#[test]
fn duplicate_segment_rejected() {
    let err = parse("block m { x: uint(8); x: uint(4); }").unwrap_err();
    assert!(err.contains("duplicate"), "unexpected error: {}", err);
}

#[test]
fn fixed_utf_rejected() {
    let err = parse("block m { u: utf8(8); }").unwrap_err();
    assert!(err.contains("utf"), "unexpected error: {}", err);
}

#[test]
fn fixed_after_dynamic_rejected() {
    let err = parse("block m { d: dynamic bits; x: uint(8); }").unwrap_err();
    assert!(err.contains("dynamic"), "unexpected error: {}", err);
}

#[test]
fn reserved_leftover_rejected() {
    let err = parse("block m { leftover: uint(8); }").unwrap_err();
    assert!(err.contains("reserved"), "unexpected error: {}", err);
}

#[test]
fn negative_default_for_unsigned_rejected() {
    let err = parse("block m { x: uint(8) = -1; }").unwrap_err();
    assert!(err.contains("negative"), "unexpected error: {}", err);
}

#[test]
fn bad_float_width_rejected() {
    let err = parse("block m { f: float(24); }").unwrap_err();
    assert!(err.contains("float"), "unexpected error: {}", err);
}
