//! Client sessions against the remote system.

use std::cell::Cell;
use std::cell::RefCell;
use std::sync::Arc;

use rfcwire::Result;
use rfcwire::RfcError;

use crate::engine::ConnAttributes;
use crate::engine::ConnHandle;
use crate::engine::RfcEngine;
use crate::engine::WideParam;
use crate::function::Function;
use crate::transaction::Transaction;

/// An open session used to fetch descriptors and invoke remote functions.
///
/// A connection exclusively owns its engine handle. [`disconnect`]
/// invalidates the handle for good: every later operation, a second
/// disconnect included, fails with `RfcError::Closed` rather than
/// touching the engine.
///
/// Not safe for concurrent use from multiple threads; use one connection
/// per thread.
///
/// [`disconnect`]: Connection::disconnect
pub struct Connection {
    engine: Arc<dyn RfcEngine>,
    handle: Cell<Option<ConnHandle>>,
    // Attribute block cache; only reopening could invalidate it, and a
    // connection cannot be reopened.
    attributes: RefCell<Option<Arc<ConnAttributes>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("handle", &self.handle.get()).finish()
    }
}

impl Connection {
    /// Opens a session from an ordered `(name, value)` parameter map.
    ///
    /// # Errors
    ///
    /// Rejects an empty map before any engine call; engine failures —
    /// most commonly a logon or communication failure — are translated
    /// and leave no usable connection behind.
    pub fn open(engine: Arc<dyn RfcEngine>, params: &[(String, String)]) -> Result<Self> {
        if params.is_empty() {
            return Err(RfcError::InvalidParameter(
                "connection parameters must not be empty".into(),
            ));
        }
        let encoded = WideParam::encode_all(params)?;
        let handle = engine.open_connection(&encoded)?;
        tracing::info!(%handle, "connection opened");
        Ok(Self {
            engine,
            handle: Cell::new(Some(handle)),
            attributes: RefCell::new(None),
        })
    }

    fn handle(&self) -> Result<ConnHandle> {
        self.handle.get().ok_or(RfcError::Closed("connection"))
    }

    /// Fetches a function descriptor from the remote system by name.
    pub fn function(&self, name: &str) -> Result<Function> {
        let conn = self.handle()?;
        let desc = self.engine.function_desc(conn, &name.to_uppercase())?;
        tracing::debug!(function = %desc.name(), "descriptor fetched");
        Ok(Function::fetched(self.engine.clone(), conn, desc))
    }

    /// The session attribute block, fetched once and cached.
    pub fn attributes(&self) -> Result<Arc<ConnAttributes>> {
        if let Some(cached) = self.attributes.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let attrs = Arc::new(self.engine.connection_attributes(self.handle()?)?);
        *self.attributes.borrow_mut() = Some(attrs.clone());
        Ok(attrs)
    }

    /// Verifies the session is still alive.
    pub fn ping(&self) -> Result<()> {
        Ok(self.engine.ping(self.handle()?)?)
    }

    /// Starts a transactional call unit, optionally bound to an outbound
    /// queue.
    pub fn start_transaction(&self, queue: Option<&str>) -> Result<Transaction> {
        Transaction::start(self.engine.clone(), self.handle()?, queue)
    }

    /// Closes the session and invalidates the handle.
    pub fn disconnect(&self) -> Result<()> {
        let handle = self.handle()?;
        self.handle.set(None);
        self.engine.close_connection(handle)?;
        tracing::info!(%handle, "connection closed");
        Ok(())
    }
}
