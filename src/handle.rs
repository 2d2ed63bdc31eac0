//! Typed 1-based handles into the manager's tables

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(usize);

        impl $name {
            /// Wrap a 1-based ordinal.
            pub const fn new(ordinal: usize) -> Self {
                Self(ordinal)
            }

            pub const fn get(self) -> usize {
                self.0
            }

            /// Position in the owning table's vector.
            pub(crate) fn index(self) -> Option<usize> {
                self.0.checked_sub(1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

pub(crate) use handle;
