use core::fmt::{self, Display};

/// A reference type, distinguished from numeric [`ValType`]s because the
/// validator and the store treat them differently (nullability, GC arenas).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefType {
    /// `funcref`.
    Func,
    /// `externref`.
    Extern,
    /// `exnref`, decode-only: the exception-handling proposal is accepted
    /// by the decoder/validator but `throw`/`catch` are not executed by
    /// the interpreter or JIT (see DESIGN.md Open Questions).
    Exn,
    /// A concrete typed reference `(ref $t)` / `(ref null $t)`, addressed
    /// by type index. `nullable` distinguishes `(ref T)` from `(ref null T)`.
    Typed { type_idx: u32, nullable: bool },
}

impl RefType {
    /// Whether values of this type may be the null reference.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Func | Self::Extern | Self::Exn => true,
            Self::Typed { nullable, .. } => *nullable,
        }
    }
}

/// The value type lattice of core Wasm plus the proposals the decoder
/// accepts. Two [`ValType`]s are equal iff their tags and, for typed
/// references, their `type_idx` coincide.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    Ref(RefType),
    /// Polymorphic marker used transiently by the validator for stack
    /// slots below an unconditional branch. Matches any concrete type in
    /// [`ValType::matches`]. Never appears in a [`FuncType`].
    Unknown,
}

impl ValType {
    /// Number of 64-bit register slots a value of this type occupies in
    /// the RegIR register file. `V128` spans two; everything else one.
    #[must_use]
    pub fn reg_slots(&self) -> u8 {
        match self {
            Self::V128 => 2,
            _ => 1,
        }
    }

    /// Whether `self` can be used in place of `expected` by the validator.
    /// `Unknown` matches anything, in either position, modeling the
    /// post-`unreachable` polymorphic stack.
    #[must_use]
    pub fn matches(&self, expected: ValType) -> bool {
        matches!(self, Self::Unknown) || matches!(expected, Self::Unknown) || *self == expected
    }

    /// Whether a local of this type may be left zero-initialized (`false`
    /// only for non-nullable typed references, per the function-references
    /// proposal's local-initialization rules, see §4.2).
    #[must_use]
    pub fn is_defaultable(&self) -> bool {
        match self {
            Self::Ref(r) => r.is_nullable(),
            _ => true,
        }
    }
}

impl Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
            Self::V128 => write!(f, "v128"),
            Self::Ref(RefType::Func) => write!(f, "funcref"),
            Self::Ref(RefType::Extern) => write!(f, "externref"),
            Self::Ref(RefType::Exn) => write!(f, "exnref"),
            Self::Ref(RefType::Typed { type_idx, nullable }) => {
                if *nullable {
                    write!(f, "(ref null {type_idx})")
                } else {
                    write!(f, "(ref {type_idx})")
                }
            }
            Self::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// An ordered parameter/result signature. Results may have arity > 1
/// (multi-value proposal).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FuncType {
    params: alloc::vec::Vec<ValType>,
    results: alloc::vec::Vec<ValType>,
}

impl FuncType {
    /// Creates a new [`FuncType`] from explicit parameter and result lists.
    #[must_use]
    pub fn new<P, R>(params: P, results: R) -> Self
    where
        P: IntoIterator<Item = ValType>,
        R: IntoIterator<Item = ValType>,
    {
        Self {
            params: params.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn params(&self) -> &[ValType] {
        &self.params
    }

    #[must_use]
    pub fn results(&self) -> &[ValType] {
        &self.results
    }
}
