//! # Engine Abstraction
//!
//! The seam between this library and the native RFC engine.
//!
//! ## Philosophy
//!
//! - **One capability, injected**: every component receives the engine as
//!   `Arc<dyn RfcEngine>`. There is no process-global binding table, so a
//!   test double can stand in for the real gateway.
//! - **Typed handles**: sessions, data containers, transactions, and
//!   server registrations are distinct handle types. You cannot pass a
//!   transaction where a connection is expected.
//! - **Wide at the boundary**: character data crosses this seam as UTF-16
//!   code units, the engine's native text shape. Host-side transcoding
//!   happens above, never below.

use std::sync::Arc;

use widestring::U16CString;
use widestring::U16String;

use rfcwire::ErrorInfo;
use rfcwire::FunctionDesc;
use rfcwire::Result;
use rfcwire::RfcError;

/// Handle to an open client session.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ConnHandle(pub u64);

impl std::fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to one data container: a function-call instance, a structure,
/// or a table.
///
/// A table handle additionally carries cursor position state inside the
/// engine; that state is never mirrored on the host side.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ContainerHandle(pub u64);

impl std::fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "container-{}", self.0)
    }
}

/// Handle to a queued/transactional call unit.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct TransactionHandle(pub u64);

impl std::fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Handle to a server registration at the gateway.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct ServerHandle(pub u64);

impl std::fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "server-{}", self.0)
    }
}

/// One connection or registration parameter, pre-encoded for the engine.
///
/// The engine consumes parameters as double-byte text with a double-null
/// terminator; encoding happens once, at construction, so a string that
/// cannot be transported is rejected before any engine call.
#[derive(Debug, Clone)]
pub struct WideParam {
    pub name: U16CString,
    pub value: U16CString,
}

impl WideParam {
    /// Encodes one `(name, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns `RfcError::InvalidParameter` for an empty name or for text
    /// containing an interior NUL, which cannot survive the terminator
    /// convention.
    pub fn new(name: &str, value: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(RfcError::InvalidParameter("parameter name must not be empty".into()));
        }
        let name = U16CString::from_str(name)
            .map_err(|_| RfcError::InvalidParameter("parameter name contains NUL".into()))?;
        let value = U16CString::from_str(value)
            .map_err(|_| RfcError::InvalidParameter("parameter value contains NUL".into()))?;
        Ok(Self { name, value })
    }

    /// Encodes an ordered `(name, value)` map.
    pub fn encode_all(params: &[(String, String)]) -> Result<Vec<WideParam>> {
        params.iter().map(|(name, value)| WideParam::new(name, value)).collect()
    }
}

/// The fixed attribute block describing an open session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnAttributes {
    pub dest: String,
    pub host: String,
    pub partner_host: String,
    pub sys_number: String,
    pub sys_id: String,
    pub client: String,
    pub user: String,
    pub language: String,
    pub trace: String,
    pub iso_language: String,
    pub codepage: String,
    pub partner_codepage: String,
    pub rfc_role: String,
    pub kind: String,
    pub partner_kind: String,
    pub rel: String,
    pub partner_rel: String,
    pub kernel_rel: String,
    pub cpic_conv_id: String,
    pub prog_name: String,
}

/// Result of one engine primitive.
///
/// The engine produces an error record for every call; `Ok` stands for a
/// record with the OK code, and `Err` carries the record of any other
/// code. A failed call must never be silently continued.
pub type EngineResult<T> = std::result::Result<T, ErrorInfo>;

/// Callback installed for one hosted function.
///
/// Invoked by the engine for each inbound call with the session handle
/// (when the engine exposes one) and the raw container holding the call's
/// parameters. Returning an error record — an application-exception
/// record included — ships that outcome back to the caller.
pub type ServerCallback =
    Box<dyn Fn(Option<ConnHandle>, ContainerHandle) -> EngineResult<()> + Send + Sync>;

/// The native RFC engine capability.
///
/// One method per engine primitive, grouped by concern. Implementations
/// own all container storage and cursor state; the wrappers above this
/// trait only hold handles.
///
/// Field names passed to container accessors are already normalized to
/// uppercase by the caller.
///
/// Decimal floating point is read-only at this seam: the engine exposes
/// `get_decf16`/`get_decf34` as lossy `f64` approximations and no setter,
/// so an unsupported write cannot reach the engine by construction. The
/// original precision of those types is a known gap, not quietly patched.
pub trait RfcEngine: Send + Sync {
    // ---- session ----

    /// Opens a client session from an ordered parameter list.
    fn open_connection(&self, params: &[WideParam]) -> EngineResult<ConnHandle>;
    /// Closes a session; the handle is invalid afterwards.
    fn close_connection(&self, conn: ConnHandle) -> EngineResult<()>;
    /// Queries the session attribute block.
    fn connection_attributes(&self, conn: ConnHandle) -> EngineResult<ConnAttributes>;
    /// Verifies the session is still alive.
    fn ping(&self, conn: ConnHandle) -> EngineResult<()>;
    /// Fetches the descriptor of a remote function module by name.
    fn function_desc(&self, conn: ConnHandle, name: &str) -> EngineResult<Arc<FunctionDesc>>;

    // ---- containers ----

    /// Creates the data container for one call of the described function.
    fn create_function_data(&self, desc: &Arc<FunctionDesc>) -> EngineResult<ContainerHandle>;
    /// Releases a container created by `create_function_data`.
    fn destroy_container(&self, handle: ContainerHandle) -> EngineResult<()>;

    /// Reads a fixed-width text field at its full declared width.
    fn get_chars(&self, handle: ContainerHandle, field: &str) -> EngineResult<U16String>;
    /// Writes a fixed-width text field; the engine truncates or pads.
    fn set_chars(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()>;
    /// Reads a digit-string field at its full declared width.
    fn get_num(&self, handle: ContainerHandle, field: &str) -> EngineResult<U16String>;
    /// Writes a digit-string field as given.
    fn set_num(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()>;
    /// Reads a fixed-size byte field.
    fn get_bytes(&self, handle: ContainerHandle, field: &str) -> EngineResult<Vec<u8>>;
    /// Writes a fixed-size byte field.
    fn set_bytes(&self, handle: ContainerHandle, field: &str, value: &[u8]) -> EngineResult<()>;
    /// Reads the 8 wire characters of a date field.
    fn get_date(&self, handle: ContainerHandle, field: &str) -> EngineResult<[u16; 8]>;
    /// Writes the 8 wire characters of a date field.
    fn set_date(&self, handle: ContainerHandle, field: &str, value: &[u16; 8]) -> EngineResult<()>;
    /// Reads the 6 wire characters of a time field.
    fn get_time(&self, handle: ContainerHandle, field: &str) -> EngineResult<[u16; 6]>;
    /// Writes the 6 wire characters of a time field.
    fn set_time(&self, handle: ContainerHandle, field: &str, value: &[u16; 6]) -> EngineResult<()>;
    /// Reads a float field.
    fn get_float(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64>;
    /// Writes a float field.
    fn set_float(&self, handle: ContainerHandle, field: &str, value: f64) -> EngineResult<()>;
    /// Reads a 4-byte integer field.
    fn get_int(&self, handle: ContainerHandle, field: &str) -> EngineResult<i32>;
    /// Writes a 4-byte integer field.
    fn set_int(&self, handle: ContainerHandle, field: &str, value: i32) -> EngineResult<()>;
    /// Reads a 2-byte integer field.
    fn get_int2(&self, handle: ContainerHandle, field: &str) -> EngineResult<i16>;
    /// Writes a 2-byte integer field.
    fn set_int2(&self, handle: ContainerHandle, field: &str, value: i16) -> EngineResult<()>;
    /// Reads a 1-byte integer field.
    fn get_int1(&self, handle: ContainerHandle, field: &str) -> EngineResult<u8>;
    /// Writes a 1-byte integer field.
    fn set_int1(&self, handle: ContainerHandle, field: &str, value: u8) -> EngineResult<()>;
    /// Reads a 16-digit decimal float as a lossy `f64`.
    fn get_decf16(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64>;
    /// Reads a 34-digit decimal float as a lossy `f64`.
    fn get_decf34(&self, handle: ContainerHandle, field: &str) -> EngineResult<f64>;
    /// Queries the current length of a variable-length text field.
    fn string_length(&self, handle: ContainerHandle, field: &str) -> EngineResult<u32>;
    /// Reads a variable-length text field into a buffer of `buf_len` units.
    fn get_string(&self, handle: ContainerHandle, field: &str, buf_len: u32) -> EngineResult<U16String>;
    /// Writes a variable-length text field without padding.
    fn set_string(&self, handle: ContainerHandle, field: &str, value: &[u16]) -> EngineResult<()>;
    /// Queries the current length of a variable-length byte field.
    fn x_string_length(&self, handle: ContainerHandle, field: &str) -> EngineResult<u32>;
    /// Reads a variable-length byte field into a buffer of `buf_len` bytes.
    fn get_x_string(&self, handle: ContainerHandle, field: &str, buf_len: u32) -> EngineResult<Vec<u8>>;
    /// Writes a variable-length byte field.
    fn set_x_string(&self, handle: ContainerHandle, field: &str, value: &[u8]) -> EngineResult<()>;
    /// Returns the container holding a nested structure field.
    fn get_structure(&self, handle: ContainerHandle, field: &str) -> EngineResult<ContainerHandle>;
    /// Copies another structure container into a structure field.
    fn set_structure(&self, handle: ContainerHandle, field: &str, value: ContainerHandle) -> EngineResult<()>;
    /// Returns the container holding a nested table field.
    fn get_table(&self, handle: ContainerHandle, field: &str) -> EngineResult<ContainerHandle>;
    /// Copies another table container into a table field.
    fn set_table(&self, handle: ContainerHandle, field: &str, value: ContainerHandle) -> EngineResult<()>;

    // ---- table cursor ----

    /// Number of rows in a table container.
    fn row_count(&self, handle: ContainerHandle) -> EngineResult<u32>;
    /// Deletes every row of a table container.
    fn delete_all_rows(&self, handle: ContainerHandle) -> EngineResult<()>;
    /// Positions the cursor on an absolute row index.
    fn move_to(&self, handle: ContainerHandle, index: u32) -> EngineResult<()>;
    /// Positions the cursor on the first row.
    fn move_to_first_row(&self, handle: ContainerHandle) -> EngineResult<()>;
    /// Advances the cursor by one row.
    fn move_to_next_row(&self, handle: ContainerHandle) -> EngineResult<()>;
    /// Returns the structure container under the cursor.
    fn current_row(&self, handle: ContainerHandle) -> EngineResult<ContainerHandle>;
    /// Appends an empty row and returns its structure container.
    fn append_new_row(&self, handle: ContainerHandle) -> EngineResult<ContainerHandle>;
    /// Appends a copy of the given structure container as a new row.
    fn append_row(&self, handle: ContainerHandle, row: ContainerHandle) -> EngineResult<()>;

    // ---- parameter activation ----

    /// Reports whether a parameter will be transmitted.
    fn is_parameter_active(&self, handle: ContainerHandle, name: &str) -> EngineResult<bool>;
    /// Gates whether a parameter is transmitted with the call.
    fn set_parameter_active(&self, handle: ContainerHandle, name: &str, active: bool) -> EngineResult<()>;

    // ---- invocation ----

    /// Executes a call synchronously over the given session.
    fn invoke(&self, conn: ConnHandle, call: ContainerHandle) -> EngineResult<()>;
    /// Queues a call under the given transaction.
    fn invoke_in_transaction(&self, tx: TransactionHandle, call: ContainerHandle) -> EngineResult<()>;

    // ---- transactions ----

    /// Fetches a fresh transaction id from the remote system.
    fn transaction_id(&self, conn: ConnHandle) -> EngineResult<String>;
    /// Creates a transaction unit, optionally bound to an outbound queue.
    fn create_transaction(&self, conn: ConnHandle, tid: &str, queue: Option<&str>) -> EngineResult<TransactionHandle>;
    /// Submits the queued calls of a transaction.
    fn submit_transaction(&self, tx: TransactionHandle) -> EngineResult<()>;
    /// Confirms a submitted transaction.
    fn confirm_transaction(&self, tx: TransactionHandle) -> EngineResult<()>;
    /// Destroys a transaction unit; the handle is invalid afterwards.
    fn destroy_transaction(&self, tx: TransactionHandle) -> EngineResult<()>;

    // ---- server ----

    /// Registers a callable endpoint at the gateway.
    fn register_server(&self, params: &[WideParam]) -> EngineResult<ServerHandle>;
    /// Installs the callback for one hosted function.
    fn install_server_function(
        &self,
        server: ServerHandle,
        desc: Arc<FunctionDesc>,
        callback: ServerCallback,
    ) -> EngineResult<()>;
    /// Waits up to `timeout_ms` for one inbound call and dispatches it.
    fn listen_and_dispatch(&self, server: ServerHandle, timeout_ms: i32) -> EngineResult<()>;
    /// Tears down a server registration; the handle is invalid afterwards.
    fn close_server(&self, server: ServerHandle) -> EngineResult<()>;
}
