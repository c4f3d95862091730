//! Strongly typed indices into the namespaces of a module.
//!
//! Each index kind is its own type. An index of one kind can never be used where an index of
//! another kind is expected, and the raw value is only reachable through [`value`](TypeIdx::value).

use {
    crate::decode::{Decode, Decoder, ParseError},
    std::fmt,
};

macro_rules! define_index {
    ($($(#[$attr:meta])* $Idx:ident;)*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
            #[repr(transparent)]
            pub struct $Idx(u32);

            impl $Idx {
                /// Creates an index with the given raw value.
                pub const fn new(value: u32) -> Self {
                    Self(value)
                }

                /// Returns the raw value of this index.
                pub const fn value(self) -> u32 {
                    self.0
                }

                pub(crate) fn to_usize(self) -> usize {
                    self.0 as usize
                }
            }

            impl fmt::Display for $Idx {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl Decode for $Idx {
                fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
                    decoder.read_index().map(Self)
                }
            }
        )*
    };
}

define_index! {
    /// An index into the type section.
    TypeIdx;
    /// An index into the function namespace: imported functions first, then defined ones.
    FuncIdx;
    /// An index into the table namespace.
    TableIdx;
    /// An index into the element segments.
    ElemIdx;
    /// An index into the memory namespace.
    MemIdx;
    /// An index into the locals of a function, parameters first.
    LocalIdx;
    /// An index into the global namespace.
    GlobalIdx;
    /// A relative label depth. Label 0 is the innermost enclosing block.
    LabelIdx;
    /// An index into the data segments.
    DataIdx;
    /// An index into the tag namespace.
    TagIdx;
}
