//! # rfcrun
//!
//! A synchronous client/server runtime over a SAP-style RFC gateway
//! engine, with generic typed marshaling between host values and the
//! engine's run-time-described containers.
//!
//! ## Architecture
//!
//! The hard part is not moving bytes — the native engine does that — but
//! marshaling: resolving a field name against a run-time descriptor,
//! dispatching on the remote type, and performing the correctly shaped
//! read or write with the engine's fixed-width, padded, wide-text layout
//! rules.
//!
//! - **RfcEngine**: the injected native-engine capability. Everything
//!   above it holds typed handles and nothing else.
//! - **DataContainer**: named-field access with one exhaustive dispatch
//!   over the type catalog, shared by [`FunctionCall`], [`Structure`],
//!   and [`Table`].
//! - **Connection / Transaction**: the client session and the
//!   submit-confirm-destroy commit unit.
//! - **Server**: gateway registration, per-function handlers, and the
//!   blocking listen-and-dispatch loop.
//! - **MockEngine**: an in-memory engine double so every contract above
//!   is testable without a gateway.
//!
//! ## Concurrency
//!
//! Everything here is synchronous and blocking; there is no internal
//! threading. No handle-bearing type is safe to share across threads —
//! use one connection (or server) per thread, and give the server's
//! dispatch loop a thread of its own if the process does anything else.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rfcrun::{Connection, DataContainer, MockEngine};
//!
//! # fn example() -> rfcwire::Result<()> {
//! let engine: Arc<dyn rfcrun::RfcEngine> = Arc::new(MockEngine::new());
//! let params = vec![
//!     ("ashost".to_string(), "ajax.example.com".to_string()),
//!     ("user".to_string(), "DEVELOPER".to_string()),
//!     ("passwd".to_string(), "secret".to_string()),
//! ];
//! let conn = Connection::open(engine, &params)?;
//! let call = conn.function("STFC_CONNECTION")?.call()?;
//! call.set("REQUTEXT", "ping")?;
//! call.invoke()?;
//! let echo = call.get("ECHOTEXT")?;
//! conn.disconnect()?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod container;
pub mod engine;
pub mod function;
pub mod mock_engine;
pub mod server;
pub mod table;
pub mod transaction;
pub mod value;

pub use connection::Connection;
pub use container::DataContainer;
pub use container::Structure;
pub use engine::ConnAttributes;
pub use engine::ConnHandle;
pub use engine::ContainerHandle;
pub use engine::EngineResult;
pub use engine::RfcEngine;
pub use engine::ServerCallback;
pub use engine::ServerHandle;
pub use engine::TransactionHandle;
pub use engine::WideParam;
pub use function::Function;
pub use function::FunctionCall;
pub use mock_engine::MockEngine;
pub use server::Server;
pub use table::Rows;
pub use table::Table;
pub use transaction::Transaction;
pub use value::Value;

#[cfg(test)]
mod tests;
