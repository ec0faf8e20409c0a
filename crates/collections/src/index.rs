/// Defines a newtype arena index backed by `u32`, implementing
/// [`crate::arena::ArenaIndex`]. Used for `MemoryIdx`, `TableIdx`,
/// `GlobalIdx`, `FuncIdx` and the Store-relative `memaddr`/`tableaddr`/…
/// indices described in §3.
#[macro_export]
macro_rules! define_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $(#[$attr])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        $vis struct $name(u32);

        impl $name {
            #[must_use]
            pub fn new(value: u32) -> Self {
                Self(value)
            }

            #[must_use]
            pub fn into_u32(self) -> u32 {
                self.0
            }
        }

        impl $crate::arena::ArenaIndex for $name {
            fn into_usize(self) -> usize {
                self.0 as usize
            }

            fn from_usize(value: usize) -> Self {
                Self(value as u32)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}
