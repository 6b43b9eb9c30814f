//! # rfcwire
//!
//! The vocabulary of the RFC gateway: the closed catalog of remote type
//! codes, the descriptor records that give a data container its shape,
//! and the error model every engine call feeds into.
//!
//! ## Philosophy
//!
//! - **Closed sets**: type codes, directions, result codes, and error
//!   groups are fixed enumerations. Dispatch over them is exhaustive, so
//!   an unhandled code is a compile error, not a runtime surprise.
//! - **Plain values**: descriptors carry no handles and no behavior; they
//!   are immutable metadata shared by reference.
//! - **One translation point**: every native error record passes through
//!   [`RfcError::from_info`], which is where an application exception is
//!   split off from engine failures.

mod desc;
mod error;
mod types;

pub use desc::FieldDesc;
pub use desc::FunctionDesc;
pub use desc::Parameter;
pub use desc::TypeDesc;

pub use error::ErrorInfo;
pub use error::Result;
pub use error::RfcError;

pub use types::Direction;
pub use types::ErrorGroup;
pub use types::ResultCode;
pub use types::RfcType;

#[cfg(test)]
mod tests;
