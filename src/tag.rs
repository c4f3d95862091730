use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        func::FuncType,
        index::TypeIdx,
    },
    std::fmt,
};

/// The attribute of a tag used for exceptions. It is the only one defined.
pub const EXCEPTION_ATTRIBUTE: u8 = 0;

/// The type of a tag as declared by a module: an attribute and the index of the function type
/// whose parameters describe the exception payload.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TagType {
    pub attribute: u8,
    pub type_idx: TypeIdx,
}

impl Decode for TagType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let attribute = decoder.read_byte()?;
        if attribute != EXCEPTION_ATTRIBUTE {
            return Err(ParseError::InvalidTag);
        }
        Ok(Self {
            attribute,
            type_idx: decoder.decode()?,
        })
    }
}

impl fmt::Display for TagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(type {})", self.type_idx)
    }
}

/// A tag instance in a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct TagInst {
    attribute: u8,
    type_: FuncType,
}

impl TagInst {
    pub(crate) fn new(attribute: u8, type_: FuncType) -> Self {
        Self { attribute, type_ }
    }

    pub fn attribute(&self) -> u8 {
        self.attribute
    }

    pub fn type_(&self) -> &FuncType {
        &self.type_
    }
}
