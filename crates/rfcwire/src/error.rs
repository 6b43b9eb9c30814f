//! # Error Definitions
//!
//! The central ledger of gateway and marshaling failures.
//!
//! Every native engine call produces an error record; a record whose code
//! is not `Ok` must surface to the caller as a typed failure. The one
//! special case is an application exception raised by the called remote
//! procedure itself: that is a business condition, not a transport
//! failure, and it is kept distinguishable so callers can branch on it.

use crate::types::ErrorGroup;
use crate::types::ResultCode;
use crate::types::RfcType;

/// The full error record produced by the native engine.
///
/// Mirrors the engine's fixed-layout error block: result code, group, a
/// short key, the long message, and the remote message fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: ResultCode,
    pub group: ErrorGroup,
    pub key: String,
    pub message: String,
    pub abap_msg_class: String,
    pub abap_msg_type: String,
    pub abap_msg_number: String,
    pub abap_msg_v1: String,
    pub abap_msg_v2: String,
    pub abap_msg_v3: String,
    pub abap_msg_v4: String,
}

impl ErrorInfo {
    /// Creates a record with the given code, group, and message.
    pub fn new(code: ResultCode, group: ErrorGroup, message: impl Into<String>) -> Self {
        Self {
            code,
            group,
            key: String::new(),
            message: message.into(),
            abap_msg_class: String::new(),
            abap_msg_type: String::new(),
            abap_msg_number: String::new(),
            abap_msg_v1: String::new(),
            abap_msg_v2: String::new(),
            abap_msg_v3: String::new(),
            abap_msg_v4: String::new(),
        }
    }

    /// Sets the short key of the record.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Record for a remote procedure that raised an application exception.
    ///
    /// The exception key is the remote-supplied condition name.
    pub fn abap_exception(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            ResultCode::AbapException,
            ErrorGroup::AbapApplicationFailure,
            format!("function exception {}", key),
        )
        .with_key(key)
    }

    /// Record for a remote runtime failure identified by a key.
    pub fn abap_runtime_failure(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ResultCode::AbapRuntimeFailure, ErrorGroup::AbapRuntimeFailure, message)
            .with_key(key)
    }

    /// Record for a rejected logon.
    pub fn logon_failure(message: impl Into<String>) -> Self {
        Self::new(ResultCode::LogonFailure, ErrorGroup::LogonFailure, message)
    }

    /// Record for a broken or unreachable connection.
    pub fn communication_failure(message: impl Into<String>) -> Self {
        Self::new(
            ResultCode::CommunicationFailure,
            ErrorGroup::CommunicationFailure,
            message,
        )
    }

    /// Record for a handle the engine does not recognize.
    pub fn invalid_handle(what: impl Into<String>) -> Self {
        Self::new(
            ResultCode::InvalidHandle,
            ErrorGroup::ExternalRuntimeFailure,
            format!("invalid {} handle", what.into()),
        )
    }

    /// Record for a malformed argument to an engine call.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(
            ResultCode::InvalidParameter,
            ErrorGroup::ExternalRuntimeFailure,
            message,
        )
    }

    /// Record for an operation issued in the wrong lifecycle state.
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(ResultCode::IllegalState, ErrorGroup::ExternalRuntimeFailure, message)
    }

    /// Record for a name the engine could not resolve.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(
            ResultCode::NotFound,
            ErrorGroup::ExternalRuntimeFailure,
            format!("{} not found", what.into()),
        )
    }

    /// Record for a failed data conversion at the engine boundary.
    pub fn conversion_failure(message: impl Into<String>) -> Self {
        Self::new(
            ResultCode::ConversionFailure,
            ErrorGroup::ExternalRuntimeFailure,
            message,
        )
    }

    /// Record for a table cursor moved before the first row.
    pub fn table_move_bof() -> Self {
        Self::new(
            ResultCode::TableMoveBof,
            ErrorGroup::ExternalRuntimeFailure,
            "cursor moved before first row",
        )
    }

    /// Record for a table cursor moved past the last row.
    pub fn table_move_eof() -> Self {
        Self::new(
            ResultCode::TableMoveEof,
            ErrorGroup::ExternalRuntimeFailure,
            "cursor moved past last row",
        )
    }

    /// Record for a poll that saw no inbound request.
    pub fn retry() -> Self {
        Self::new(
            ResultCode::Retry,
            ErrorGroup::ExternalRuntimeFailure,
            "nothing to dispatch",
        )
    }

    /// Record for a session the peer has closed.
    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Closed, ErrorGroup::CommunicationFailure, message)
    }

    /// Record for a failure in the external runtime.
    pub fn external_failure(message: impl Into<String>) -> Self {
        Self::new(
            ResultCode::ExternalFailure,
            ErrorGroup::ExternalRuntimeFailure,
            message,
        )
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {}, group {})", self.message, self.code, self.group)?;
        if !self.key.is_empty() {
            write!(f, " [{}]", self.key)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorInfo {}

/// Failures surfaced by this library.
///
/// `Engine` carries the untranslated record of a failed native call;
/// `AbapException` and `AbapMessage` carry conditions signaled by the
/// remote procedure's own logic. The remaining variants originate on the
/// host side, before any engine call is made.
#[derive(Debug, Clone, PartialEq)]
pub enum RfcError {
    /// The native engine reported a failure; the full record is attached.
    Engine(ErrorInfo),
    /// The called remote procedure raised an application exception.
    AbapException {
        /// The remote-supplied exception key.
        key: String,
    },
    /// The called remote procedure signaled a message condition.
    AbapMessage(ErrorInfo),
    /// The host value does not fit the field's declared type.
    ValueMismatch {
        field: String,
        expected: RfcType,
        found: &'static str,
    },
    /// The operation is not supported for this type; fails fast rather
    /// than proceed with undefined results.
    Unsupported {
        field: String,
        ty: RfcType,
        op: &'static str,
    },
    /// Invoke on a call instance that carries no connection.
    NotCallable,
    /// Use of a connection, transaction, or server after it was closed.
    Closed(&'static str),
    /// A malformed argument rejected before reaching the engine.
    InvalidParameter(String),
}

impl RfcError {
    /// Translates a native error record into the typed error.
    ///
    /// An application-exception record becomes the distinct
    /// [`RfcError::AbapException`] carrying only the exception key; a
    /// message record becomes [`RfcError::AbapMessage`]; everything else
    /// is an engine failure.
    pub fn from_info(info: ErrorInfo) -> Self {
        match info.code {
            ResultCode::AbapException => RfcError::AbapException { key: info.key },
            ResultCode::AbapMessage => RfcError::AbapMessage(info),
            _ => RfcError::Engine(info),
        }
    }

    /// The result code behind this error, where one exists.
    pub fn code(&self) -> Option<ResultCode> {
        match self {
            RfcError::Engine(info) | RfcError::AbapMessage(info) => Some(info.code),
            RfcError::AbapException { .. } => Some(ResultCode::AbapException),
            _ => None,
        }
    }

    /// The error group behind this error, where one exists.
    pub fn group(&self) -> Option<ErrorGroup> {
        match self {
            RfcError::Engine(info) | RfcError::AbapMessage(info) => Some(info.group),
            RfcError::AbapException { .. } => Some(ErrorGroup::AbapApplicationFailure),
            _ => None,
        }
    }
}

impl std::fmt::Display for RfcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RfcError::Engine(info) => write!(f, "engine failure: {}", info),
            RfcError::AbapException { key } => write!(f, "function exception {}", key),
            RfcError::AbapMessage(info) => write!(f, "function message: {}", info),
            RfcError::ValueMismatch { field, expected, found } => {
                write!(f, "field {} expects {}, got {}", field, expected, found)
            }
            RfcError::Unsupported { field, ty, op } => {
                write!(f, "{} not supported for {} field {}", op, ty, field)
            }
            RfcError::NotCallable => write!(f, "function call instance has no connection"),
            RfcError::Closed(what) => write!(f, "{} is closed", what),
            RfcError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for RfcError {}

impl From<ErrorInfo> for RfcError {
    fn from(info: ErrorInfo) -> Self {
        Self::from_info(info)
    }
}

/// Specialized `Result` for gateway operations.
pub type Result<T> = std::result::Result<T, RfcError>;
