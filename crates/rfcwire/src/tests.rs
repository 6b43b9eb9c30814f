use std::sync::Arc;

use crate::Direction;
use crate::ErrorGroup;
use crate::ErrorInfo;
use crate::FunctionDesc;
use crate::Parameter;
use crate::ResultCode;
use crate::RfcError;
use crate::RfcType;
use crate::TypeDesc;

const ALL_TYPES: [RfcType; 18] = [
    RfcType::Char,
    RfcType::Date,
    RfcType::Bcd,
    RfcType::Time,
    RfcType::Byte,
    RfcType::Table,
    RfcType::Num,
    RfcType::Float,
    RfcType::Int,
    RfcType::Int2,
    RfcType::Int1,
    RfcType::Null,
    RfcType::Structure,
    RfcType::Decf16,
    RfcType::Decf34,
    RfcType::XmlData,
    RfcType::String,
    RfcType::XString,
];

#[test]
fn test_type_codes_round_trip() {
    for ty in ALL_TYPES {
        assert_eq!(RfcType::from_code(ty.code()), Some(ty));
    }
    // Gaps in the numbering and out-of-range codes are unknown.
    assert_eq!(RfcType::from_code(11), None);
    assert_eq!(RfcType::from_code(16), None);
    assert_eq!(RfcType::from_code(99), None);
}

#[test]
fn test_result_codes_round_trip() {
    for code in 0..=26 {
        let rc = ResultCode::from_code(code).expect("dense codes");
        assert_eq!(rc.code(), code);
    }
    assert_eq!(ResultCode::from_code(27), None);
    assert_eq!(ResultCode::from_code(0), Some(ResultCode::Ok));
    assert_eq!(ResultCode::from_code(26), Some(ResultCode::UnknownError));
}

#[test]
fn test_error_groups_round_trip() {
    for code in 0..=6 {
        let group = ErrorGroup::from_code(code).expect("dense codes");
        assert_eq!(group.code(), code);
    }
    assert_eq!(ErrorGroup::from_code(7), None);
}

#[test]
fn test_direction_rules() {
    assert_eq!(Direction::from_code(7), Some(Direction::Tables));
    assert_eq!(Direction::from_code(4), None);
    assert!(Direction::Import.can_write());
    assert!(!Direction::Import.can_read());
    assert!(Direction::Export.can_read());
    assert!(!Direction::Export.can_write());
    assert!(Direction::Changing.can_read() && Direction::Changing.can_write());
    assert!(Direction::Tables.can_read() && Direction::Tables.can_write());
}

#[test]
fn test_parameter_names_normalize_to_uppercase() {
    let field = Parameter::new("rfc_string", RfcType::String)
        .direction(Direction::Import)
        .build()
        .unwrap();
    assert_eq!(field.name, "RFC_STRING");

    let desc = FunctionDesc::new("my_function", vec![field]);
    assert_eq!(desc.name(), "MY_FUNCTION");
    assert!(desc.parameter("Rfc_String").is_some());
    assert!(desc.parameter("MISSING").is_none());
}

#[test]
fn test_parameter_requires_length_for_packed_types() {
    for ty in [RfcType::Char, RfcType::Num, RfcType::Byte, RfcType::Bcd, RfcType::Decf16, RfcType::Decf34] {
        let err = Parameter::new("P", ty).build().unwrap_err();
        match err {
            RfcError::InvalidParameter(msg) => assert!(msg.contains("length"), "{}", msg),
            other => panic!("Expected InvalidParameter, got {:?}", other),
        }
    }
    assert!(Parameter::new("P", RfcType::Bcd).length(12).decimals(3).build().is_ok());
}

#[test]
fn test_parameter_intrinsic_widths() {
    let date = Parameter::new("D", RfcType::Date).build().unwrap();
    assert_eq!((date.nuc_length, date.uc_length), (8, 16));
    let time = Parameter::new("T", RfcType::Time).build().unwrap();
    assert_eq!((time.nuc_length, time.uc_length), (6, 12));
    let int2 = Parameter::new("I", RfcType::Int2).build().unwrap();
    assert_eq!((int2.nuc_length, int2.uc_length), (2, 2));

    // A contradictory explicit length is rejected at construction.
    let err = Parameter::new("D", RfcType::Date).length(10).build().unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));
}

#[test]
fn test_parameter_rejects_untransferable_types() {
    for ty in [RfcType::Null, RfcType::XmlData] {
        let err = Parameter::new("P", ty).build().unwrap_err();
        assert!(matches!(err, RfcError::InvalidParameter(_)));
    }
}

#[test]
fn test_composite_parameter_needs_nested_layout() {
    let err = Parameter::new("TAB", RfcType::Table).build().unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));

    let row = Arc::new(TypeDesc::new(
        "ROW",
        vec![Parameter::new("F", RfcType::Char).length(4).build().unwrap()],
    ));
    let tab = Parameter::new("TAB", RfcType::Table)
        .direction(Direction::Tables)
        .nested(row.clone())
        .build()
        .unwrap();
    assert_eq!(tab.nested.as_ref().map(|t| t.name()), Some("ROW"));
    assert!(row.field("f").is_some());
    assert_eq!(row.field_names(), vec!["F".to_string()]);
}

#[test]
fn test_abap_exception_becomes_distinct_error() {
    let err = RfcError::from_info(ErrorInfo::abap_exception("NOT_AUTHORIZED"));
    match err {
        RfcError::AbapException { ref key } => assert_eq!(key, "NOT_AUTHORIZED"),
        other => panic!("Expected AbapException, got {:?}", other),
    }
    assert_eq!(err.code(), Some(ResultCode::AbapException));
    assert_eq!(err.group(), Some(ErrorGroup::AbapApplicationFailure));
}

#[test]
fn test_engine_failures_keep_their_record() {
    let err = RfcError::from_info(ErrorInfo::logon_failure("name or password incorrect"));
    match &err {
        RfcError::Engine(info) => {
            assert_eq!(info.code, ResultCode::LogonFailure);
            assert_eq!(info.group, ErrorGroup::LogonFailure);
        }
        other => panic!("Expected Engine, got {:?}", other),
    }
    assert_eq!(err.code(), Some(ResultCode::LogonFailure));
    assert!(format!("{}", err).contains("name or password incorrect"));
}

#[test]
fn test_abap_message_is_distinguishable() {
    let info = ErrorInfo::new(ResultCode::AbapMessage, ErrorGroup::AbapApplicationFailure, "order blocked")
        .with_key("V1");
    match RfcError::from_info(info) {
        RfcError::AbapMessage(info) => assert_eq!(info.key, "V1"),
        other => panic!("Expected AbapMessage, got {:?}", other),
    }
}
