//! Hosts an uppercase-echo function against the mock engine and drains a
//! few scripted inbound calls through the dispatch loop.

use std::sync::Arc;

use rfcrun::DataContainer;
use rfcrun::Function;
use rfcrun::MockEngine;
use rfcrun::RfcEngine;
use rfcrun::Server;
use rfcrun::Value;
use rfcwire::Direction;
use rfcwire::Parameter;
use rfcwire::RfcType;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let engine = Arc::new(MockEngine::new());
    let dyn_engine: Arc<dyn RfcEngine> = engine.clone();

    let mut function = Function::local(dyn_engine.clone(), "MY_STRING");
    function.add_parameter(
        Parameter::new("RFC_STRING", RfcType::String).direction(Direction::Import),
    )?;
    function.add_parameter(
        Parameter::new("RFC_UPPER", RfcType::String).direction(Direction::Export),
    )?;

    let registration = vec![
        ("gwhost".to_string(), "localhost".to_string()),
        ("program_id".to_string(), "RUSTNWRFC".to_string()),
    ];
    let server = Server::register(dyn_engine, &registration)?;
    server.install(&function, |call| {
        let Value::Str(text) = call.get("RFC_STRING")? else {
            return Ok(());
        };
        tracing::info!(%text, "inbound call");
        call.set("RFC_UPPER", text.to_uppercase())?;
        Ok(())
    })?;

    for text in ["hello", "gateway", "world"] {
        engine.enqueue_call(
            "RUSTNWRFC",
            "MY_STRING",
            Box::new(move |eng, call| {
                let units: Vec<u16> = text.encode_utf16().collect();
                eng.set_string(call, "RFC_STRING", &units)
            }),
        )?;
    }

    // The mock reports the registration closed once the queue is empty,
    // which is this demo's way out of the loop.
    if let Err(err) = server.serve() {
        tracing::info!(%err, "dispatch loop ended");
    }

    for (function, call) in engine.completed_calls() {
        let length = engine.string_length(call, "RFC_UPPER")?;
        let upper = engine.get_string(call, "RFC_UPPER", length + 1)?;
        tracing::info!(%function, upper = %upper.to_string_lossy(), "served");
    }

    server.disconnect()?;
    Ok(())
}
