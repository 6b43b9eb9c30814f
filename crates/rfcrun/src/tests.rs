//! Marshaling tests against the mock engine.

use std::sync::Arc;

use chrono::NaiveDate;
use chrono::NaiveTime;

use rfcwire::Direction;
use rfcwire::FieldDesc;
use rfcwire::FunctionDesc;
use rfcwire::Parameter;
use rfcwire::ResultCode;
use rfcwire::RfcError;
use rfcwire::RfcType;
use rfcwire::TypeDesc;

use crate::DataContainer;
use crate::Function;
use crate::MockEngine;
use crate::RfcEngine;
use crate::Structure;
use crate::Value;

fn engine() -> Arc<MockEngine> {
    Arc::new(MockEngine::new())
}

fn dyn_engine(engine: &Arc<MockEngine>) -> Arc<dyn RfcEngine> {
    engine.clone()
}

/// Row layout modeled on the classic RFCTEST structure.
fn test_row() -> Arc<TypeDesc> {
    Arc::new(TypeDesc::new(
        "RFCTEST",
        vec![
            Parameter::new("RFCFLOAT", RfcType::Float).build().unwrap(),
            Parameter::new("RFCCHAR1", RfcType::Char).length(1).build().unwrap(),
            Parameter::new("RFCINT2", RfcType::Int2).build().unwrap(),
            Parameter::new("RFCINT1", RfcType::Int1).build().unwrap(),
            Parameter::new("RFCCHAR4", RfcType::Char).length(4).build().unwrap(),
            Parameter::new("RFCINT4", RfcType::Int).build().unwrap(),
            Parameter::new("RFCTIME", RfcType::Time).build().unwrap(),
            Parameter::new("RFCDATE", RfcType::Date).build().unwrap(),
            Parameter::new("RFCDATA1", RfcType::Char).length(50).build().unwrap(),
        ],
    ))
}

/// A locally declared function exercising every marshaling path.
fn probe_function(engine: &Arc<MockEngine>) -> Function {
    let mut function = Function::local(dyn_engine(engine), "MARSHAL_PROBE");
    function
        .add_parameter(
            Parameter::new("IMPORTSTRUCT", RfcType::Structure)
                .direction(Direction::Import)
                .nested(test_row()),
        )
        .unwrap();
    function
        .add_parameter(
            Parameter::new("RFCTABLE", RfcType::Table)
                .direction(Direction::Tables)
                .nested(test_row()),
        )
        .unwrap();
    function
        .add_parameter(
            Parameter::new("BCDVAL", RfcType::Bcd)
                .length(12)
                .decimals(4)
                .direction(Direction::Import),
        )
        .unwrap();
    function
        .add_parameter(Parameter::new("NUMVAL", RfcType::Num).length(8).direction(Direction::Import))
        .unwrap();
    function
        .add_parameter(Parameter::new("RAW", RfcType::Byte).length(4).direction(Direction::Import))
        .unwrap();
    function
        .add_parameter(Parameter::new("NOTE", RfcType::String).direction(Direction::Import))
        .unwrap();
    function
        .add_parameter(Parameter::new("BLOB", RfcType::XString).direction(Direction::Import))
        .unwrap();
    function
        .add_parameter(
            Parameter::new("DECVAL", RfcType::Decf16).length(8).direction(Direction::Import),
        )
        .unwrap();
    function
}

fn import_struct(function: &Function) -> Structure {
    let call = function.call().unwrap();
    match call.get("IMPORTSTRUCT").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    }
}

#[test]
fn test_float_and_integer_round_trips() {
    let engine = engine();
    let is = import_struct(&probe_function(&engine));

    is.set("RFCFLOAT", 10.9154).unwrap();
    assert_eq!(is.get("RFCFLOAT").unwrap(), Value::Float(10.9154));

    is.set("RFCINT2", 32767i16).unwrap();
    assert_eq!(is.get("RFCINT2").unwrap(), Value::Int2(32767));
    is.set("RFCINT2", -32767i16).unwrap();
    assert_eq!(is.get("RFCINT2").unwrap(), Value::Int2(-32767));

    is.set("RFCINT1", 255u8).unwrap();
    assert_eq!(is.get("RFCINT1").unwrap(), Value::Int1(255));

    is.set("RFCINT4", 2147483647).unwrap();
    assert_eq!(is.get("RFCINT4").unwrap(), Value::Int(2147483647));
    is.set("RFCINT4", -2147483648).unwrap();
    assert_eq!(is.get("RFCINT4").unwrap(), Value::Int(-2147483648));

    // Narrower integers are accepted by wider fields.
    is.set("RFCINT4", 7u8).unwrap();
    assert_eq!(is.get("RFCINT4").unwrap(), Value::Int(7));
}

#[test]
fn test_char_fields_pad_and_truncate() {
    let engine = engine();
    let is = import_struct(&probe_function(&engine));

    is.set("RFCCHAR1", "a").unwrap();
    assert_eq!(is.get("RFCCHAR1").unwrap(), Value::Chars("a".into()));

    is.set("RFCCHAR4", "abcd").unwrap();
    assert_eq!(is.get("RFCCHAR4").unwrap(), Value::Chars("abcd".into()));

    // Overlong text is cut at the field width.
    is.set("RFCCHAR4", "abcdef").unwrap();
    assert_eq!(is.get("RFCCHAR4").unwrap(), Value::Chars("abcd".into()));

    // Short text comes back without its pad.
    is.set("RFCDATA1", "short text").unwrap();
    assert_eq!(is.get("RFCDATA1").unwrap(), Value::Chars("short text".into()));
}

#[test]
fn test_date_and_time_coercion() {
    let engine = engine();
    let is = import_struct(&probe_function(&engine));
    let date = NaiveDate::from_ymd_opt(2012, 3, 14).unwrap();
    let time = NaiveTime::from_hms_opt(13, 45, 1).unwrap();

    // A digit string and a calendar value store the same field content.
    is.set("RFCDATE", "20120314").unwrap();
    let from_text = is.get("RFCDATE").unwrap();
    is.set("RFCDATE", date).unwrap();
    let from_value = is.get("RFCDATE").unwrap();
    assert_eq!(from_text, from_value);
    assert_eq!(from_value, Value::Date(date));

    is.set("RFCTIME", "134501").unwrap();
    let from_text = is.get("RFCTIME").unwrap();
    is.set("RFCTIME", time).unwrap();
    let from_value = is.get("RFCTIME").unwrap();
    assert_eq!(from_text, from_value);
    assert_eq!(from_value, Value::Time(time));
}

#[test]
fn test_num_preserves_leading_zeros() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    call.set("NUMVAL", "00012345").unwrap();
    assert_eq!(call.get("NUMVAL").unwrap(), Value::Num("00012345".into()));
}

#[test]
fn test_bcd_travels_as_decimal_text() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    call.set("BCDVAL", Value::Bcd(10.25)).unwrap();
    assert_eq!(call.get("BCDVAL").unwrap(), Value::Bcd(10.25));

    // Plain floats and integers coerce into packed fields.
    call.set("BCDVAL", 3.5).unwrap();
    assert_eq!(call.get("BCDVAL").unwrap(), Value::Bcd(3.5));
    call.set("BCDVAL", 42).unwrap();
    assert_eq!(call.get("BCDVAL").unwrap(), Value::Bcd(42.0));
}

#[test]
fn test_byte_fields_keep_their_size() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    call.set("RAW", vec![1u8, 2, 3, 4]).unwrap();
    assert_eq!(call.get("RAW").unwrap(), Value::Bytes(vec![1, 2, 3, 4]));

    // Short input is zero-padded to the field size.
    call.set("RAW", vec![9u8, 8]).unwrap();
    assert_eq!(call.get("RAW").unwrap(), Value::Bytes(vec![9, 8, 0, 0]));
}

#[test]
fn test_string_and_xstring_round_trip() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    let long: String = (1..=1000).map(|n| (b'a' + (n % 26) as u8) as char).collect();
    call.set("NOTE", long.as_str()).unwrap();
    assert_eq!(call.get("NOTE").unwrap(), Value::Str(long));

    call.set("BLOB", Value::XStr(vec![0, 255, 128, 7])).unwrap();
    assert_eq!(call.get("BLOB").unwrap(), Value::XStr(vec![0, 255, 128, 7]));
}

#[test]
fn test_decimal_float_write_fails_fast() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    match call.set("DECVAL", 1.5).unwrap_err() {
        RfcError::Unsupported { field, ty, op } => {
            assert_eq!(field, "DECVAL");
            assert_eq!(ty, RfcType::Decf16);
            assert_eq!(op, "write");
        }
        other => panic!("Expected Unsupported, got {:?}", other),
    }

    // Reads approximate as floats; an untouched field reads as zero.
    assert_eq!(call.get("DECVAL").unwrap(), Value::Decf(0.0));
}

#[test]
fn test_decimal_float_read_approximates_seeded_value() {
    let engine = engine();
    let desc = Arc::new(FunctionDesc::new(
        "DEC_READER",
        vec![
            Parameter::new("D", RfcType::Decf34)
                .length(16)
                .direction(Direction::Export)
                .build()
                .unwrap(),
        ],
    ));
    let handle = engine.create_function_data(&desc).unwrap();
    engine.seed_decf(handle, "D", 20.723623123).unwrap();
    assert_eq!(engine.get_decf34(handle, "D").unwrap(), 20.723623123);
}

#[test]
fn test_null_fields_are_never_legitimate() {
    let engine = engine();
    let row = Arc::new(TypeDesc::new(
        "LEGACY_ROW",
        vec![FieldDesc {
            name: "LEGACY".into(),
            ty: RfcType::Null,
            direction: None,
            nuc_length: 0,
            uc_length: 0,
            decimals: 0,
            optional: false,
            nested: None,
            default_value: None,
            text: None,
        }],
    ));
    let mut function = Function::local(dyn_engine(&engine), "LEGACY_PROBE");
    function
        .add_parameter(
            Parameter::new("S", RfcType::Structure).direction(Direction::Import).nested(row),
        )
        .unwrap();
    let call = function.call().unwrap();
    let s = match call.get("S").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    };

    assert!(matches!(s.get("LEGACY"), Err(RfcError::Unsupported { op: "read", .. })));
    assert!(matches!(s.set("LEGACY", "x"), Err(RfcError::Unsupported { op: "write", .. })));
}

#[test]
fn test_unknown_field_is_reported() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    match call.get("NO_SUCH_FIELD").unwrap_err() {
        RfcError::Engine(info) => assert_eq!(info.code, ResultCode::NotFound),
        other => panic!("Expected Engine(NotFound), got {:?}", other),
    }
}

#[test]
fn test_type_mismatch_is_rejected() {
    let engine = engine();
    let is = import_struct(&probe_function(&engine));

    match is.set("RFCCHAR4", vec![1u8, 2]).unwrap_err() {
        RfcError::ValueMismatch { field, expected, found } => {
            assert_eq!(field, "RFCCHAR4");
            assert_eq!(expected, RfcType::Char);
            assert_eq!(found, "bytes");
        }
        other => panic!("Expected ValueMismatch, got {:?}", other),
    }

    // Composite fields only accept existing composite values.
    let function = probe_function(&engine);
    let call = function.call().unwrap();
    assert!(matches!(
        call.set("RFCTABLE", "not a table"),
        Err(RfcError::ValueMismatch { .. })
    ));
    assert!(matches!(
        call.set("IMPORTSTRUCT", 1),
        Err(RfcError::ValueMismatch { .. })
    ));
}

#[test]
fn test_fields_follow_declaration_order() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    let expected: Vec<String> = ["IMPORTSTRUCT", "RFCTABLE", "BCDVAL", "NUMVAL", "RAW", "NOTE", "BLOB", "DECVAL"]
        .iter()
        .map(|name| name.to_string())
        .collect();
    assert_eq!(call.fields(), expected);

    let desc = call.describe("bcdval").unwrap();
    assert_eq!(desc.ty, RfcType::Bcd);
    assert_eq!(desc.nuc_length, 12);
    assert_eq!(desc.decimals, 4);
}

#[test]
fn test_table_append_count_clear() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();
    let table = match call.get("RFCTABLE").unwrap() {
        Value::Table(t) => t,
        other => panic!("Expected Table, got {:?}", other),
    };

    assert_eq!(table.size().unwrap(), 0);
    assert_eq!(table.rows().unwrap().count(), 0);

    let row = table.new_row().unwrap();
    row.set("RFCINT4", 1).unwrap();
    assert_eq!(table.size().unwrap(), 1);

    let row = table.new_row().unwrap();
    row.set("RFCINT4", 2).unwrap();
    assert_eq!(table.size().unwrap(), 2);

    table.clear().unwrap();
    assert_eq!(table.size().unwrap(), 0);

    match table.row_at(0).unwrap_err() {
        RfcError::Engine(info) => assert_eq!(info.code, ResultCode::TableMoveEof),
        other => panic!("Expected Engine(TableMoveEof), got {:?}", other),
    }
}

#[test]
fn test_table_iteration_matches_indexing() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();
    let table = match call.get("RFCTABLE").unwrap() {
        Value::Table(t) => t,
        other => panic!("Expected Table, got {:?}", other),
    };

    for n in 0..5 {
        let row = table.new_row().unwrap();
        row.set("RFCINT4", n).unwrap();
        row.set("RFCCHAR4", format!("R{:03}", n)).unwrap();
    }
    assert_eq!(table.size().unwrap(), 5);

    let mut seen = Vec::new();
    for row in table.rows().unwrap() {
        seen.push(row.unwrap().get("RFCINT4").unwrap());
    }
    assert_eq!(
        seen,
        (0..5).map(Value::Int).collect::<Vec<_>>()
    );

    for n in 0..5u32 {
        let row = table.row_at(n).unwrap();
        assert_eq!(row.get("RFCINT4").unwrap(), Value::Int(n as i32));
        assert_eq!(row.get("RFCCHAR4").unwrap(), Value::Chars(format!("R{:03}", n)));
    }
}

#[test]
fn test_append_copies_the_row() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();
    let table = match call.get("RFCTABLE").unwrap() {
        Value::Table(t) => t,
        other => panic!("Expected Table, got {:?}", other),
    };

    let first = table.new_row().unwrap();
    first.set("RFCINT4", 11).unwrap();
    table.append(&first).unwrap();
    assert_eq!(table.size().unwrap(), 2);

    // The appended row is a copy, not an alias.
    first.set("RFCINT4", 99).unwrap();
    assert_eq!(table.row_at(0).unwrap().get("RFCINT4").unwrap(), Value::Int(99));
    assert_eq!(table.row_at(1).unwrap().get("RFCINT4").unwrap(), Value::Int(11));
}

#[test]
fn test_structure_assignment_copies_content() {
    let engine = engine();
    let function = probe_function(&engine);

    let source_call = function.call().unwrap();
    let source = match source_call.get("IMPORTSTRUCT").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    };
    source.set("RFCCHAR4", "srce").unwrap();
    source.set("RFCINT4", 321).unwrap();

    let target_call = function.call().unwrap();
    target_call.set("IMPORTSTRUCT", source.clone()).unwrap();
    source.set("RFCINT4", -1).unwrap();

    let target = match target_call.get("IMPORTSTRUCT").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    };
    assert_eq!(target.get("RFCCHAR4").unwrap(), Value::Chars("srce".into()));
    assert_eq!(target.get("RFCINT4").unwrap(), Value::Int(321));
}

#[test]
fn test_nested_structure_persists_across_reads() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();

    let first = match call.get("IMPORTSTRUCT").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    };
    first.set("RFCINT2", 77i16).unwrap();

    let second = match call.get("IMPORTSTRUCT").unwrap() {
        Value::Structure(s) => s,
        other => panic!("Expected Structure, got {:?}", other),
    };
    assert_eq!(second.get("RFCINT2").unwrap(), Value::Int2(77));
}

#[test]
fn test_local_descriptor_rules() {
    let engine = engine();
    let mut function = Function::local(dyn_engine(&engine), "my_function");
    assert_eq!(function.name(), "MY_FUNCTION");

    function
        .add_parameter(
            Parameter::new("MY_PARAM", RfcType::Char).length(20).direction(Direction::Import),
        )
        .unwrap();
    assert_eq!(function.parameter_count(), 1);

    // Duplicates and invalid definitions are rejected.
    let err = function
        .add_parameter(Parameter::new("my_param", RfcType::Char).length(5))
        .unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));
    let err = function
        .add_parameter(Parameter::new("P2", RfcType::Bcd).direction(Direction::Import))
        .unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));
    assert_eq!(function.parameter_count(), 1);
}

#[test]
fn test_invoke_without_connection_is_not_callable() {
    let engine = engine();
    let function = probe_function(&engine);
    let call = function.call().unwrap();
    assert!(matches!(call.invoke(), Err(RfcError::NotCallable)));
}
