//! End-to-end lifecycle suite: client sessions, transactions, and the
//! server dispatch loop, all against the mock engine.

use std::sync::Arc;

use rfcwire::Direction;
use rfcwire::ErrorGroup;
use rfcwire::ErrorInfo;
use rfcwire::Parameter;
use rfcwire::ResultCode;
use rfcwire::RfcError;
use rfcwire::RfcType;

use rfcrun::Connection;
use rfcrun::DataContainer;
use rfcrun::Function;
use rfcrun::MockEngine;
use rfcrun::RfcEngine;
use rfcrun::Server;
use rfcrun::Value;

fn engine() -> Arc<MockEngine> {
    Arc::new(MockEngine::new().with_user("DEVELOPER", "secret"))
}

fn dyn_engine(engine: &Arc<MockEngine>) -> Arc<dyn RfcEngine> {
    engine.clone()
}

fn login_params() -> Vec<(String, String)> {
    [
        ("ashost", "gateway.example.com"),
        ("sysnr", "00"),
        ("client", "100"),
        ("user", "DEVELOPER"),
        ("passwd", "secret"),
        ("lang", "EN"),
    ]
    .iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}

fn connect(engine: &Arc<MockEngine>) -> Connection {
    Connection::open(dyn_engine(engine), &login_params()).unwrap()
}

/// Publishes a char-echo function on the remote side of the mock.
fn define_echo(engine: &Arc<MockEngine>) {
    let mut desc = Vec::new();
    desc.push(
        Parameter::new("REQUTEXT", RfcType::Char)
            .length(32)
            .direction(Direction::Import)
            .build()
            .unwrap(),
    );
    desc.push(
        Parameter::new("ECHOTEXT", RfcType::Char)
            .length(32)
            .direction(Direction::Export)
            .build()
            .unwrap(),
    );
    desc.push(
        Parameter::new("FILTER", RfcType::Char)
            .length(10)
            .direction(Direction::Import)
            .optional()
            .build()
            .unwrap(),
    );
    engine.define_function(rfcwire::FunctionDesc::new("STFC_CONNECTION", desc));
    engine.on_invoke(
        "STFC_CONNECTION",
        Box::new(|eng, call| {
            let text = eng.get_chars(call, "REQUTEXT")?;
            eng.set_chars(call, "ECHOTEXT", text.as_slice())?;
            Ok(())
        }),
    );
}

#[test]
fn test_connect_fetch_invoke_disconnect() {
    let engine = engine();
    define_echo(&engine);
    let conn = connect(&engine);

    let function = conn.function("stfc_connection").unwrap();
    assert_eq!(function.name(), "STFC_CONNECTION");
    assert_eq!(function.parameter_count(), 3);

    let call = function.call().unwrap();
    call.set("REQUTEXT", "Wazzup").unwrap();
    call.invoke().unwrap();
    assert_eq!(call.get("ECHOTEXT").unwrap(), call.get("REQUTEXT").unwrap());

    conn.disconnect().unwrap();
}

#[test]
fn test_bad_login_maps_to_logon_failure() {
    let engine = engine();
    let mut params = login_params();
    params[3].1 = "Z_A_Z_AZ".to_string();
    params[4].1 = "A@#1&ZA!".to_string();

    let err = Connection::open(dyn_engine(&engine), &params).unwrap_err();
    assert_eq!(err.code(), Some(ResultCode::LogonFailure));
    assert_eq!(err.group(), Some(ErrorGroup::LogonFailure));
}

#[test]
fn test_empty_parameter_map_is_rejected() {
    let engine = engine();
    let err = Connection::open(dyn_engine(&engine), &[]).unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));
}

#[test]
fn test_disconnect_invalidates_the_handle() {
    let engine = engine();
    define_echo(&engine);
    let conn = connect(&engine);
    conn.disconnect().unwrap();

    assert!(matches!(conn.function("STFC_CONNECTION"), Err(RfcError::Closed("connection"))));
    assert!(matches!(conn.ping(), Err(RfcError::Closed("connection"))));
    assert!(matches!(conn.attributes(), Err(RfcError::Closed("connection"))));
    // A second disconnect fails too; it does not silently succeed.
    assert!(matches!(conn.disconnect(), Err(RfcError::Closed("connection"))));
}

#[test]
fn test_attributes_are_cached() {
    let engine = engine();
    let conn = connect(&engine);

    let first = conn.attributes().unwrap();
    assert_eq!(first.user, "DEVELOPER");
    assert_eq!(first.host, "gateway.example.com");
    assert_eq!(first.client, "100");

    let second = conn.attributes().unwrap();
    assert_eq!(first, second);
    let fetches = engine.journal().iter().filter(|e| e.as_str() == "attributes").count();
    assert_eq!(fetches, 1);

    conn.disconnect().unwrap();
}

#[test]
fn test_missing_function_surfaces_engine_error() {
    let engine = engine();
    let conn = connect(&engine);

    let err = conn.function("ZZ_NO_SUCH_FUNCTION").unwrap_err();
    match err {
        RfcError::Engine(info) => {
            assert_eq!(info.code, ResultCode::AbapRuntimeFailure);
            assert_eq!(info.key, "FU_NOT_FOUND");
        }
        other => panic!("Expected Engine failure, got {:?}", other),
    }
}

#[test]
fn test_remote_exception_is_distinguishable() {
    let engine = engine();
    define_echo(&engine);
    engine.on_invoke(
        "STFC_CONNECTION",
        Box::new(|_eng, _call| Err(ErrorInfo::abap_exception("NOT_AUTHORIZED"))),
    );
    let conn = connect(&engine);
    let call = conn.function("STFC_CONNECTION").unwrap().call().unwrap();

    match call.invoke().unwrap_err() {
        RfcError::AbapException { key } => assert_eq!(key, "NOT_AUTHORIZED"),
        other => panic!("Expected AbapException, got {:?}", other),
    }
}

#[test]
fn test_inactive_parameters_are_not_transmitted() {
    let engine = engine();
    define_echo(&engine);
    let conn = connect(&engine);
    let call = conn.function("STFC_CONNECTION").unwrap().call().unwrap();

    assert!(call.is_active("FILTER").unwrap());
    call.set_active("FILTER", false).unwrap();
    assert!(!call.is_active("FILTER").unwrap());

    call.set("REQUTEXT", "hello").unwrap();
    call.invoke().unwrap();

    let journal = engine.journal();
    let invoke = journal
        .iter()
        .find(|entry| entry.starts_with("invoke STFC_CONNECTION"))
        .expect("invoke recorded");
    assert!(invoke.contains("REQUTEXT"));
    assert!(!invoke.contains("FILTER"));
}

#[test]
fn test_transaction_commit_ordering() {
    let engine = engine();
    define_echo(&engine);
    let conn = connect(&engine);

    let tx = conn.start_transaction(None).unwrap();
    assert!(!tx.tid().is_empty());
    assert!(tx.tid().len() <= 50);

    let call = conn.function("STFC_CONNECTION").unwrap().call().unwrap();
    call.set("REQUTEXT", "queued").unwrap();
    call.invoke_in_transaction(&tx).unwrap();

    tx.commit().unwrap();

    let tid = tx.tid().to_string();
    let journal = engine.journal();
    let position = |entry: String| journal.iter().position(|e| *e == entry).unwrap();
    let queued = position(format!("tx-invoke {} STFC_CONNECTION", tid));
    let submit = position(format!("submit {}", tid));
    let confirm = position(format!("confirm {}", tid));
    let destroy = position(format!("destroy {}", tid));
    assert!(queued < submit && submit < confirm && confirm < destroy);

    // The unit is destroyed; committing again must fail, not no-op.
    assert!(matches!(tx.commit(), Err(RfcError::Closed("transaction"))));
    assert!(matches!(call.invoke_in_transaction(&tx), Err(RfcError::Closed("transaction"))));
}

#[test]
fn test_failed_submit_prevents_confirm_and_destroy() {
    let engine = engine();
    let conn = connect(&engine);
    let tx = conn.start_transaction(Some("OUTBOUND")).unwrap();
    assert_eq!(tx.queue(), Some("OUTBOUND"));

    engine.fail_next_submit();
    match tx.commit().unwrap_err() {
        RfcError::Engine(info) => assert_eq!(info.code, ResultCode::ExternalFailure),
        other => panic!("Expected Engine failure, got {:?}", other),
    }

    let tid = tx.tid();
    let journal = engine.journal();
    assert!(journal.iter().any(|e| *e == format!("create-tx {} queue=OUTBOUND", tid)));
    assert!(!journal.iter().any(|e| e.starts_with(&format!("submit {}", tid))));
    assert!(!journal.iter().any(|e| e.starts_with(&format!("confirm {}", tid))));
    assert!(!journal.iter().any(|e| e.starts_with(&format!("destroy {}", tid))));

    // The unit stayed open, so a retried commit can still succeed.
    tx.commit().unwrap();
}

fn hosted_function(engine: &Arc<MockEngine>) -> Function {
    let mut function = Function::local(dyn_engine(engine), "MY_STRING");
    function
        .add_parameter(
            Parameter::new("RFC_STRING", RfcType::String).direction(Direction::Import),
        )
        .unwrap();
    function
        .add_parameter(
            Parameter::new("RFC_UPPER", RfcType::String).direction(Direction::Export),
        )
        .unwrap();
    function
}

fn register_params() -> Vec<(String, String)> {
    [("gwhost", "gateway.example.com"), ("program_id", "RUSTNWRFC")]
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn enqueue_string_call(engine: &Arc<MockEngine>, text: &'static str) {
    engine
        .enqueue_call(
            "RUSTNWRFC",
            "MY_STRING",
            Box::new(move |eng, call| {
                let units: Vec<u16> = text.encode_utf16().collect();
                eng.set_string(call, "RFC_STRING", &units)
            }),
        )
        .unwrap();
}

#[test]
fn test_server_loop_dispatches_and_survives_exceptions() {
    let engine = engine();
    let server = Server::register(dyn_engine(&engine), &register_params()).unwrap();
    let function = hosted_function(&engine);

    server
        .install(&function, |call| {
            let text = match call.get("RFC_STRING")? {
                Value::Str(text) => text,
                other => panic!("Expected Str, got {:?}", other),
            };
            if text == "boom" {
                // A business condition inside the handler; the loop must
                // keep serving.
                return Err(RfcError::AbapException { key: "BAD_INPUT".into() });
            }
            call.set("RFC_UPPER", text.to_uppercase())?;
            Ok(())
        })
        .unwrap();

    enqueue_string_call(&engine, "hello, how are you?");
    enqueue_string_call(&engine, "boom");
    enqueue_string_call(&engine, "still alive");
    engine.allow_idle_polls(2);

    // The queue drains, the exception and the idle retries are survived,
    // and the scripted close finally stops the loop.
    match server.serve().unwrap_err() {
        RfcError::Engine(info) => assert_eq!(info.code, ResultCode::Closed),
        other => panic!("Expected Engine(Closed), got {:?}", other),
    }

    let completed = engine.completed_calls();
    assert_eq!(completed.len(), 2);
    let first = completed[0].1;
    let length = engine.string_length(first, "RFC_UPPER").unwrap();
    let upper = engine.get_string(first, "RFC_UPPER", length + 1).unwrap();
    assert_eq!(upper.to_string().unwrap(), "HELLO, HOW ARE YOU?");

    let journal = engine.journal();
    assert_eq!(journal.iter().filter(|e| e.as_str() == "dispatch MY_STRING").count(), 3);
    assert_eq!(journal.iter().filter(|e| e.as_str() == "poll-idle").count(), 3);

    server.disconnect().unwrap();
}

#[test]
fn test_server_disconnect_invalidates_the_handle() {
    let engine = engine();
    let server = Server::register(dyn_engine(&engine), &register_params()).unwrap();
    let function = hosted_function(&engine);
    server.disconnect().unwrap();

    assert!(matches!(server.serve(), Err(RfcError::Closed("server"))));
    assert!(matches!(server.install(&function, |_| Ok(())), Err(RfcError::Closed("server"))));
    assert!(matches!(server.disconnect(), Err(RfcError::Closed("server"))));
}

#[test]
fn test_server_registration_needs_a_program_id() {
    let engine = engine();
    let params: Vec<(String, String)> =
        vec![("gwhost".to_string(), "gateway.example.com".to_string())];
    let err = Server::register(dyn_engine(&engine), &params).unwrap_err();
    match err {
        RfcError::Engine(info) => assert_eq!(info.code, ResultCode::InvalidParameter),
        other => panic!("Expected Engine failure, got {:?}", other),
    }

    let err = Server::register(dyn_engine(&engine), &[]).unwrap_err();
    assert!(matches!(err, RfcError::InvalidParameter(_)));
}
