use core::fmt::{self, Display};

/// An invalid [`TrapCode`] ordinal, returned by [`TrapCode::try_from`].
#[derive(Debug, Copy, Clone)]
pub struct InvalidTrapCode;

macro_rules! generate_trap_code {
    ( $( $(#[$attr:meta])* $ident:ident = $discr:literal ),* $(,)? ) => {
        /// The reason a Wasm function trapped. Propagates through every
        /// enclosing frame unwinding the interpreter/JIT call stack (§4.4,
        /// §4.6). Mirrors the ordinal contract the JIT call trampoline
        /// returns to native code: 0 means success, and each variant here
        /// is the non-zero code the trampoline maps it to.
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        #[repr(u8)]
        pub enum TrapCode {
            $( $(#[$attr])* $ident = $discr ),*
        }

        impl From<TrapCode> for u8 {
            fn from(code: TrapCode) -> Self {
                code as _
            }
        }

        impl TryFrom<u8> for TrapCode {
            type Error = InvalidTrapCode;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $discr => Ok(TrapCode::$ident), )*
                    _ => Err(InvalidTrapCode),
                }
            }
        }
    };
}

generate_trap_code! {
    // Zero is reserved for "no trap" so `u64`-returning JIT frames can use
    // 0 as a success sentinel (§4.5 ABI: `fn(...) -> u64`, 0 = success).
    /// `unreachable` was actually reached.
    Unreachable = 1,
    /// A function frame exceeded the register stack.
    StackOverflow = 2,
    /// Division or remainder by zero.
    DivisionByZero = 3,
    /// Signed division overflow (`MIN / -1`).
    IntegerOverflow = 4,
    /// Out-of-bounds linear memory access.
    OutOfBoundsMemoryAccess = 5,
    /// Out-of-bounds table access or undefined element.
    UndefinedElement = 6,
    /// `call_indirect`/`return_call_indirect` signature mismatch.
    MismatchedSignatures = 7,
    /// An invalid float-to-int conversion (NaN, inf, out of range).
    InvalidConversion = 8,
    /// An uncaught Wasm exception (exception-handling proposal).
    WasmException = 9,
    /// The `fuel` budget reached zero.
    OutOfFuel = 10,
    /// A `ResourceLimiter`/capacity ceiling rejected a growth operation.
    GrowthLimited = 11,
}

impl TrapCode {
    /// The ordinal the JIT call trampoline and ABI boundary (§4.5, §4.6)
    /// use to communicate this trap across the native/interpreter edge.
    #[must_use]
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    /// Human-readable trap message, matching the wording the Wasm spec
    /// testsuite expects.
    #[must_use]
    pub fn trap_message(&self) -> &'static str {
        match self {
            Self::Unreachable => "wasm `unreachable` instruction executed",
            Self::StackOverflow => "call stack exhausted",
            Self::DivisionByZero => "integer divide by zero",
            Self::IntegerOverflow => "integer overflow",
            Self::OutOfBoundsMemoryAccess => "out of bounds memory access",
            Self::UndefinedElement => "undefined element: out of bounds table access",
            Self::MismatchedSignatures => "indirect call type mismatch",
            Self::InvalidConversion => "invalid conversion to integer",
            Self::WasmException => "uncaught wasm exception",
            Self::OutOfFuel => "all fuel consumed by WebAssembly",
            Self::GrowthLimited => "growth operation limited",
        }
    }
}

impl Display for TrapCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.trap_message())
    }
}

/// A process-exit request raised by a WASI `proc_exit` host call. Carried
/// alongside traps so the outermost invoker can distinguish "the Wasm
/// program asked to exit with code N" from an actual fault (§7).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Trap {
    reason: TrapReason,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TrapReason {
    Code(TrapCode),
    Exit(i32),
}

impl Trap {
    #[must_use]
    pub fn new(code: TrapCode) -> Self {
        Self {
            reason: TrapReason::Code(code),
        }
    }

    #[must_use]
    pub fn exit(status: i32) -> Self {
        Self {
            reason: TrapReason::Exit(status),
        }
    }

    /// The classic `i32` exit status, if this trap originated from
    /// `proc_exit` rather than an instruction fault.
    #[must_use]
    pub fn i32_exit_status(&self) -> Option<i32> {
        match self.reason {
            TrapReason::Exit(status) => Some(status),
            TrapReason::Code(_) => None,
        }
    }

    #[must_use]
    pub fn trap_code(&self) -> Option<TrapCode> {
        match self.reason {
            TrapReason::Code(code) => Some(code),
            TrapReason::Exit(_) => None,
        }
    }
}

impl From<TrapCode> for Trap {
    fn from(code: TrapCode) -> Self {
        Self::new(code)
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            TrapReason::Code(code) => Display::fmt(&code, f),
            TrapReason::Exit(status) => write!(f, "exited with i32 exit status {status}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Trap {}
