//! Queued/transactional call units.

use std::cell::Cell;
use std::sync::Arc;

use rfcwire::Result;
use rfcwire::RfcError;

use crate::engine::ConnHandle;
use crate::engine::RfcEngine;
use crate::engine::TransactionHandle;

/// Longest transaction id the engine accepts, in bytes.
const MAX_TID_LEN: usize = 50;

/// A group of calls committed as one unit.
///
/// Created by [`Connection::start_transaction`], which fetches the
/// transaction id from the remote system. Calls join the unit through
/// [`FunctionCall::invoke_in_transaction`]; [`commit`] then runs
/// submit, confirm, and destroy in strict order.
///
/// [`Connection::start_transaction`]: crate::connection::Connection::start_transaction
/// [`FunctionCall::invoke_in_transaction`]: crate::function::FunctionCall::invoke_in_transaction
/// [`commit`]: Transaction::commit
pub struct Transaction {
    engine: Arc<dyn RfcEngine>,
    handle: Cell<Option<TransactionHandle>>,
    tid: String,
    queue: Option<String>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("tid", &self.tid)
            .field("queue", &self.queue)
            .field("handle", &self.handle.get())
            .finish()
    }
}

impl Transaction {
    pub(crate) fn start(
        engine: Arc<dyn RfcEngine>,
        conn: ConnHandle,
        queue: Option<&str>,
    ) -> Result<Self> {
        let tid = engine.transaction_id(conn)?;
        if tid.len() > MAX_TID_LEN {
            return Err(RfcError::InvalidParameter(format!(
                "transaction id exceeds {} bytes",
                MAX_TID_LEN
            )));
        }
        let handle = engine.create_transaction(conn, &tid, queue)?;
        tracing::debug!(%tid, %handle, "transaction started");
        Ok(Self {
            engine,
            handle: Cell::new(Some(handle)),
            tid,
            queue: queue.map(str::to_string),
        })
    }

    pub(crate) fn handle(&self) -> Result<TransactionHandle> {
        self.handle.get().ok_or(RfcError::Closed("transaction"))
    }

    /// The transaction id fetched from the remote system.
    pub fn tid(&self) -> &str {
        &self.tid
    }

    /// The outbound queue this unit is bound to, if any.
    pub fn queue(&self) -> Option<&str> {
        self.queue.as_deref()
    }

    /// Commits the unit: submit, confirm, destroy, in that order.
    ///
    /// Fail-fast: a failed step prevents the later steps from running,
    /// and the unit stays open so the failure can be inspected. After a
    /// successful commit the unit is destroyed; a second commit fails
    /// with `RfcError::Closed` rather than quietly doing nothing.
    pub fn commit(&self) -> Result<()> {
        let handle = self.handle()?;
        self.engine.submit_transaction(handle)?;
        self.engine.confirm_transaction(handle)?;
        self.engine.destroy_transaction(handle)?;
        self.handle.set(None);
        tracing::debug!(tid = %self.tid, "transaction committed");
        Ok(())
    }
}
