//! # Server
//!
//! Hosting functions callable from the remote system.
//!
//! A server registers at the gateway under a program id, installs one
//! handler per hosted function name, and then runs a blocking poll loop
//! that turns each inbound call into a [`FunctionCall`] handed to the
//! handler. The loop is the server's entire control flow; run it on a
//! dedicated thread if the process has anything else to do.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::Mutex;

use rfcwire::ErrorInfo;
use rfcwire::Result;
use rfcwire::ResultCode;
use rfcwire::RfcError;

use crate::engine::RfcEngine;
use crate::engine::ServerCallback;
use crate::engine::ServerHandle;
use crate::engine::WideParam;
use crate::function::Function;
use crate::function::FunctionCall;

/// Default poll interval of the dispatch loop, in milliseconds.
pub const DEFAULT_POLL_MS: i32 = 200;

/// A registered endpoint hosting functions for inbound calls.
pub struct Server {
    engine: Arc<dyn RfcEngine>,
    handle: Cell<Option<ServerHandle>>,
    poll_ms: i32,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("handle", &self.handle.get())
            .field("poll_ms", &self.poll_ms)
            .finish()
    }
}

impl Server {
    /// Registers at the gateway from an ordered parameter map
    /// (gateway host and program id, at minimum).
    ///
    /// # Errors
    ///
    /// Rejects an empty map before any engine call; engine failures are
    /// translated exactly like connection failures.
    pub fn register(engine: Arc<dyn RfcEngine>, params: &[(String, String)]) -> Result<Self> {
        if params.is_empty() {
            return Err(RfcError::InvalidParameter(
                "registration parameters must not be empty".into(),
            ));
        }
        let encoded = WideParam::encode_all(params)?;
        let handle = engine.register_server(&encoded)?;
        tracing::info!(%handle, "server registered");
        Ok(Self {
            engine,
            handle: Cell::new(Some(handle)),
            poll_ms: DEFAULT_POLL_MS,
        })
    }

    fn handle(&self) -> Result<ServerHandle> {
        self.handle.get().ok_or(RfcError::Closed("server"))
    }

    /// Sets the poll interval of the dispatch loop.
    pub fn set_poll_interval(&mut self, poll_ms: i32) {
        self.poll_ms = poll_ms;
    }

    /// Installs a handler for one hosted function.
    ///
    /// On each inbound call the engine hands over the raw parameter
    /// container; it is wrapped as a connectionless [`FunctionCall`] and
    /// passed to the handler, which reads import parameters and writes
    /// export parameters through the container accessors. A handler
    /// error travels back to the remote caller; an
    /// [`RfcError::AbapException`] arrives there as an application
    /// exception with its key intact.
    pub fn install<H>(&self, function: &Function, handler: H) -> Result<()>
    where
        H: FnMut(&mut FunctionCall) -> Result<()> + Send + 'static,
    {
        let server = self.handle()?;
        let desc = function.descriptor();
        let engine = self.engine.clone();
        let slot = Mutex::new(handler);
        let callback_desc = desc.clone();
        let callback: ServerCallback = Box::new(move |_conn, container| {
            // No connection reference reaches the server path; the call
            // is data-access only.
            let mut call = FunctionCall::from_inbound(engine.clone(), container, callback_desc.clone());
            let mut handler = slot
                .lock()
                .map_err(|_| ErrorInfo::external_failure("handler poisoned by an earlier panic"))?;
            match (*handler)(&mut call) {
                Ok(()) => Ok(()),
                Err(RfcError::AbapException { key }) => Err(ErrorInfo::abap_exception(key)),
                Err(RfcError::Engine(info)) | Err(RfcError::AbapMessage(info)) => Err(info),
                Err(other) => Err(ErrorInfo::external_failure(other.to_string())),
            }
        });
        self.engine.install_server_function(server, desc.clone(), callback)?;
        tracing::info!(function = %desc.name(), "handler installed");
        Ok(())
    }

    /// Runs the blocking listen-and-dispatch loop.
    ///
    /// The loop keeps polling while the engine reports success, an empty
    /// poll (retry), or an application exception inside a hosted
    /// function — none of those are fatal to the server. Any other
    /// result stops the loop and propagates as the translated error.
    pub fn serve(&self) -> Result<()> {
        let server = self.handle()?;
        tracing::info!(%server, poll_ms = self.poll_ms, "dispatch loop running");
        loop {
            match self.engine.listen_and_dispatch(server, self.poll_ms) {
                Ok(()) => {}
                Err(info) => match info.code {
                    ResultCode::Retry => {}
                    ResultCode::AbapException => {
                        tracing::warn!(key = %info.key, "hosted function raised an exception");
                    }
                    _ => {
                        tracing::warn!(code = %info.code, "dispatch loop stopped");
                        return Err(info.into());
                    }
                },
            }
        }
    }

    /// Tears down the registration and invalidates the handle.
    ///
    /// Later calls to [`serve`], [`install`], or a second disconnect
    /// fail with `RfcError::Closed`.
    ///
    /// [`serve`]: Server::serve
    /// [`install`]: Server::install
    pub fn disconnect(&self) -> Result<()> {
        let handle = self.handle()?;
        self.handle.set(None);
        self.engine.close_server(handle)?;
        tracing::info!(%handle, "server closed");
        Ok(())
    }
}
