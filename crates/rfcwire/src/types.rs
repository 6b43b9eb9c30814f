//! The fixed enumerations of the gateway protocol: value type codes,
//! parameter directions, result codes, and error groups.
//!
//! All four sets are closed. The numeric values are part of the wire
//! contract with the native engine and must not be renumbered.

/// Identifies the remote type of a field or parameter.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RfcType {
    /// Fixed-width text, right-padded with spaces.
    Char = 0,
    /// Calendar date, stored as the 8 characters `YYYYMMDD`.
    Date = 1,
    /// Packed decimal, exposed as decimal text / float.
    Bcd = 2,
    /// Time of day, stored as the 6 characters `HHMMSS`.
    Time = 3,
    /// Fixed-size raw byte buffer.
    Byte = 4,
    /// Cursor-addressable sequence of structures.
    Table = 5,
    /// Digit string; leading zeros are significant.
    Num = 6,
    /// 8-byte IEEE 754 float.
    Float = 7,
    /// 4-byte signed integer.
    Int = 8,
    /// 2-byte signed integer.
    Int2 = 9,
    /// 1-byte unsigned integer.
    Int1 = 10,
    /// Sentinel; never a legitimate runtime value.
    Null = 14,
    /// Nested composite value with named fields.
    Structure = 17,
    /// 16-digit decimal floating point.
    Decf16 = 23,
    /// 34-digit decimal floating point.
    Decf34 = 24,
    /// Obsolete XML transfer format; never used.
    XmlData = 28,
    /// Variable-length text.
    String = 29,
    /// Variable-length raw bytes.
    XString = 30,
}

impl RfcType {
    /// Returns the type for a given wire code, or `None` if unknown.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(RfcType::Char),
            1 => Some(RfcType::Date),
            2 => Some(RfcType::Bcd),
            3 => Some(RfcType::Time),
            4 => Some(RfcType::Byte),
            5 => Some(RfcType::Table),
            6 => Some(RfcType::Num),
            7 => Some(RfcType::Float),
            8 => Some(RfcType::Int),
            9 => Some(RfcType::Int2),
            10 => Some(RfcType::Int1),
            14 => Some(RfcType::Null),
            17 => Some(RfcType::Structure),
            23 => Some(RfcType::Decf16),
            24 => Some(RfcType::Decf34),
            28 => Some(RfcType::XmlData),
            29 => Some(RfcType::String),
            30 => Some(RfcType::XString),
            _ => None,
        }
    }

    /// The wire code of this type.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// The symbolic name used by the remote system.
    pub fn name(self) -> &'static str {
        match self {
            RfcType::Char => "CHAR",
            RfcType::Date => "DATE",
            RfcType::Bcd => "BCD",
            RfcType::Time => "TIME",
            RfcType::Byte => "BYTE",
            RfcType::Table => "TABLE",
            RfcType::Num => "NUM",
            RfcType::Float => "FLOAT",
            RfcType::Int => "INT",
            RfcType::Int2 => "INT2",
            RfcType::Int1 => "INT1",
            RfcType::Null => "NULL",
            RfcType::Structure => "STRUCTURE",
            RfcType::Decf16 => "DECF16",
            RfcType::Decf34 => "DECF34",
            RfcType::XmlData => "XMLDATA",
            RfcType::String => "STRING",
            RfcType::XString => "XSTRING",
        }
    }

    /// Returns true for table and structure.
    pub fn is_composite(self) -> bool {
        matches!(self, RfcType::Table | RfcType::Structure)
    }

    /// The intrinsic field width in wire units, for types that have one.
    ///
    /// Types without an intrinsic width (text, packed decimals, byte
    /// buffers) take their width from the descriptor instead.
    pub fn fixed_width(self) -> Option<u32> {
        match self {
            RfcType::Date => Some(8),
            RfcType::Time => Some(6),
            RfcType::Float => Some(8),
            RfcType::Int => Some(4),
            RfcType::Int2 => Some(2),
            RfcType::Int1 => Some(1),
            _ => None,
        }
    }

    /// Returns true if a descriptor for this type must carry an explicit
    /// length.
    pub fn needs_length(self) -> bool {
        matches!(
            self,
            RfcType::Char
                | RfcType::Num
                | RfcType::Byte
                | RfcType::Bcd
                | RfcType::Decf16
                | RfcType::Decf34
        )
    }
}

impl std::fmt::Display for RfcType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The transfer direction of a function parameter.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Caller to callee.
    Import = 1,
    /// Callee to caller.
    Export = 2,
    /// Both directions.
    Changing = 3,
    /// Table parameters travel in both directions.
    Tables = 7,
}

impl Direction {
    /// Returns the direction for a given wire code, or `None` if unknown.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Direction::Import),
            2 => Some(Direction::Export),
            3 => Some(Direction::Changing),
            7 => Some(Direction::Tables),
            _ => None,
        }
    }

    /// The wire code of this direction.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// True if the caller may write this parameter before the call.
    pub fn can_write(self) -> bool {
        matches!(self, Direction::Import | Direction::Changing | Direction::Tables)
    }

    /// True if the caller may read this parameter after the call.
    pub fn can_read(self) -> bool {
        matches!(self, Direction::Export | Direction::Changing | Direction::Tables)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::Import => "IMPORT",
            Direction::Export => "EXPORT",
            Direction::Changing => "CHANGING",
            Direction::Tables => "TABLES",
        };
        write!(f, "{}", name)
    }
}

/// Result code attached to every native engine call.
///
/// `Ok` means the call succeeded; every other code identifies a failure
/// class. The order matches the engine's own enumeration.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok = 0,
    CommunicationFailure = 1,
    LogonFailure = 2,
    AbapRuntimeFailure = 3,
    AbapMessage = 4,
    AbapException = 5,
    Closed = 6,
    Canceled = 7,
    Timeout = 8,
    MemoryInsufficient = 9,
    VersionMismatch = 10,
    InvalidProtocol = 11,
    SerializationFailure = 12,
    InvalidHandle = 13,
    Retry = 14,
    ExternalFailure = 15,
    Executed = 16,
    NotFound = 17,
    NotSupported = 18,
    IllegalState = 19,
    InvalidParameter = 20,
    CodepageConversionFailure = 21,
    ConversionFailure = 22,
    BufferTooSmall = 23,
    TableMoveBof = 24,
    TableMoveEof = 25,
    UnknownError = 26,
}

impl ResultCode {
    /// Returns the code for a given wire value, or `None` if unknown.
    pub fn from_code(code: u32) -> Option<Self> {
        if code > ResultCode::UnknownError as u32 {
            return None;
        }
        // Discriminants are dense, so a table keeps this in sync with the
        // enum declaration.
        const ALL: [ResultCode; 27] = [
            ResultCode::Ok,
            ResultCode::CommunicationFailure,
            ResultCode::LogonFailure,
            ResultCode::AbapRuntimeFailure,
            ResultCode::AbapMessage,
            ResultCode::AbapException,
            ResultCode::Closed,
            ResultCode::Canceled,
            ResultCode::Timeout,
            ResultCode::MemoryInsufficient,
            ResultCode::VersionMismatch,
            ResultCode::InvalidProtocol,
            ResultCode::SerializationFailure,
            ResultCode::InvalidHandle,
            ResultCode::Retry,
            ResultCode::ExternalFailure,
            ResultCode::Executed,
            ResultCode::NotFound,
            ResultCode::NotSupported,
            ResultCode::IllegalState,
            ResultCode::InvalidParameter,
            ResultCode::CodepageConversionFailure,
            ResultCode::ConversionFailure,
            ResultCode::BufferTooSmall,
            ResultCode::TableMoveBof,
            ResultCode::TableMoveEof,
            ResultCode::UnknownError,
        ];
        Some(ALL[code as usize])
    }

    /// The wire value of this code.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Coarse failure classification accompanying every error record.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorGroup {
    Ok = 0,
    AbapApplicationFailure = 1,
    AbapRuntimeFailure = 2,
    LogonFailure = 3,
    CommunicationFailure = 4,
    ExternalRuntimeFailure = 5,
    ExternalApplicationFailure = 6,
}

impl ErrorGroup {
    /// Returns the group for a given wire value, or `None` if unknown.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(ErrorGroup::Ok),
            1 => Some(ErrorGroup::AbapApplicationFailure),
            2 => Some(ErrorGroup::AbapRuntimeFailure),
            3 => Some(ErrorGroup::LogonFailure),
            4 => Some(ErrorGroup::CommunicationFailure),
            5 => Some(ErrorGroup::ExternalRuntimeFailure),
            6 => Some(ErrorGroup::ExternalApplicationFailure),
            _ => None,
        }
    }

    /// The wire value of this group.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl std::fmt::Display for ErrorGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
