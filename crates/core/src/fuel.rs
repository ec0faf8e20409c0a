use core::fmt::{self, Display};

/// Raised by [`Fuel::consume`] when a decrement would take the budget
/// below zero. The caller converts this into a [`crate::TrapCode::OutOfFuel`]
/// trap (§4.4, §7).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FuelError;

impl Display for FuelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fuel exhausted")
    }
}

/// An optional per-invocation instruction budget (§4.4). Every RegIR
/// instruction the interpreter dispatches decrements it by one; the JIT
/// decrements it via an inlined counter check at block entry when fuel
/// metering is enabled in [`crate`]'s engine `Config`.
#[derive(Debug, Clone, Copy)]
pub struct Fuel {
    remaining: u64,
}

impl Fuel {
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self { remaining: budget }
    }

    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Consumes one unit of fuel.
    ///
    /// # Errors
    ///
    /// Returns [`FuelError`] if the budget was already zero; the caller is
    /// expected to trap with `OutOfFuel` and not decrement further.
    pub fn consume(&mut self) -> Result<(), FuelError> {
        match self.remaining.checked_sub(1) {
            Some(rem) => {
                self.remaining = rem;
                Ok(())
            }
            None => Err(FuelError),
        }
    }
}
