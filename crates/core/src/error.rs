use crate::trap::Trap;
use alloc::string::String;
use core::fmt::{self, Display};

/// Fatal errors raised while parsing the raw Wasm binary section structure
/// (§4.1). All are detected before validation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Truncated,
    BadMagic,
    BadVersion,
    DuplicateSection(u8),
    MalformedLeb128,
    LengthMismatch { expected: u32, actual: u32 },
    InvalidSectionId(u8),
    InvalidForm(u8),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "unexpected end of Wasm binary"),
            Self::BadMagic => write!(f, "bad magic number"),
            Self::BadVersion => write!(f, "unsupported binary version"),
            Self::DuplicateSection(id) => write!(f, "duplicate section id {id}"),
            Self::MalformedLeb128 => write!(f, "malformed LEB128 integer"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch: expected {expected}, got {actual}")
            }
            Self::InvalidSectionId(id) => write!(f, "invalid section id {id}"),
            Self::InvalidForm(form) => write!(f, "invalid type form byte 0x{form:02x}"),
        }
    }
}

/// Fatal errors raised by the bytecode validator (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    TypeMismatch { expected: String, found: String },
    InvalidAlignment,
    InvalidLaneIndex,
    UnknownLocal(u32),
    UninitializedLocal(u32),
    UnknownGlobal(u32),
    UnknownFunction(u32),
    UnknownType(u32),
    UnknownTable(u32),
    UnknownMemory(u32),
    UnknownLabel(u32),
    UnknownDataSegment(u32),
    UnknownElemSegment(u32),
    ImmutableGlobal(u32),
    InvalidResultArity,
    ConstantExprRequired,
    DataCountRequired,
    IllegalOpcode(u16),
    DuplicateExportName(String),
    ControlStackUnderflow,
    OperandStackUnderflow,
    /// The instruction stream (or a constant expression) ended, or
    /// contained a malformed LEB128 immediate, before a well-formed
    /// program could be recognized.
    Truncated,
    /// A binary-valid construct this engine's translator does not lower:
    /// a multi-value block/loop/if type, a `br_table` target with a
    /// non-empty result arity, or a function needing more virtual
    /// registers than the translator's budget (§4.3).
    Unsupported(String),
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::InvalidAlignment => write!(f, "alignment must not be larger than natural"),
            Self::InvalidLaneIndex => write!(f, "lane index out of bounds"),
            Self::UnknownLocal(i) => write!(f, "unknown local {i}"),
            Self::UninitializedLocal(i) => write!(f, "uninitialized local {i}"),
            Self::UnknownGlobal(i) => write!(f, "unknown global {i}"),
            Self::UnknownFunction(i) => write!(f, "unknown function {i}"),
            Self::UnknownType(i) => write!(f, "unknown type {i}"),
            Self::UnknownTable(i) => write!(f, "unknown table {i}"),
            Self::UnknownMemory(i) => write!(f, "unknown memory {i}"),
            Self::UnknownLabel(i) => write!(f, "unknown label {i}"),
            Self::UnknownDataSegment(i) => write!(f, "unknown data segment {i}"),
            Self::UnknownElemSegment(i) => write!(f, "unknown elem segment {i}"),
            Self::ImmutableGlobal(i) => write!(f, "global {i} is immutable"),
            Self::InvalidResultArity => write!(f, "invalid result arity"),
            Self::ConstantExprRequired => write!(f, "expected a constant expression"),
            Self::DataCountRequired => write!(f, "data count section required"),
            Self::IllegalOpcode(op) => write!(f, "illegal opcode 0x{op:04x}"),
            Self::DuplicateExportName(name) => write!(f, "duplicate export name {name:?}"),
            Self::ControlStackUnderflow => write!(f, "control stack underflow"),
            Self::OperandStackUnderflow => write!(f, "operand stack underflow"),
            Self::Truncated => write!(f, "unexpected end of function body"),
            Self::Unsupported(what) => write!(f, "unsupported: {what}"),
        }
    }
}

/// Fatal errors raised while instantiating a decoded+validated [`Module`]
/// (linking imports, evaluating initializers, placing data/elements).
///
/// [`Module`]: https://docs.rs/zwasm
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstantiationError {
    ImportNotFound { module: String, name: String },
    LinkMismatch { module: String, name: String },
    MemoryInitOob,
    ElementInitOob,
    ConstExprEvalFailed,
    TooManyMemories,
    TooManyTables,
    /// The module's start function trapped while `instantiate` ran it;
    /// the instance is not returned to the caller (§3 "instantiation",
    /// §4.4 "Call sequence").
    StartTrapped(Trap),
}

impl Display for InstantiationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ImportNotFound { module, name } => {
                write!(f, "import not found: {module}::{name}")
            }
            Self::LinkMismatch { module, name } => {
                write!(f, "import type mismatch: {module}::{name}")
            }
            Self::MemoryInitOob => write!(f, "data segment does not fit in memory"),
            Self::ElementInitOob => write!(f, "element segment does not fit in table"),
            Self::ConstExprEvalFailed => write!(f, "failed to evaluate constant expression"),
            Self::TooManyMemories => write!(f, "module declares more memories than supported"),
            Self::TooManyTables => write!(f, "module declares more tables than supported"),
            Self::StartTrapped(trap) => write!(f, "start function trapped: {trap}"),
        }
    }
}

/// The top-level sum type every fallible `zwasm` operation returns,
/// unifying the four fatal-error layers (decode, validate, instantiate)
/// with runtime [`Trap`]s (§7 error taxonomy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WasmError {
    Decode(DecodeError),
    Validate(ValidationError),
    Instantiate(InstantiationError),
    Trap(Trap),
}

impl From<DecodeError> for WasmError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

impl From<ValidationError> for WasmError {
    fn from(e: ValidationError) -> Self {
        Self::Validate(e)
    }
}

impl From<InstantiationError> for WasmError {
    fn from(e: InstantiationError) -> Self {
        Self::Instantiate(e)
    }
}

impl From<Trap> for WasmError {
    fn from(e: Trap) -> Self {
        Self::Trap(e)
    }
}

impl From<crate::TrapCode> for WasmError {
    fn from(code: crate::TrapCode) -> Self {
        Self::Trap(Trap::from(code))
    }
}

impl Display for WasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::Validate(e) => write!(f, "validation error: {e}"),
            Self::Instantiate(e) => write!(f, "instantiation error: {e}"),
            Self::Trap(e) => write!(f, "trap: {e}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WasmError {}
