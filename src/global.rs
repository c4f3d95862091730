use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        val::{Val, ValType, Value},
    },
    std::fmt,
    thiserror::Error,
};

/// The type of a global.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GlobalType {
    pub mut_: Mut,
    pub val: ValType,
}

impl GlobalType {
    pub fn new(val: ValType, mut_: Mut) -> Self {
        Self { mut_, val }
    }
}

impl Decode for GlobalType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let val = decoder.decode()?;
        let mut_ = decoder.decode()?;
        Ok(Self { mut_, val })
    }
}

impl fmt::Display for GlobalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mut_ {
            Mut::Const => write!(f, "{}", self.val),
            Mut::Var => write!(f, "(mut {})", self.val),
        }
    }
}

/// The mutability of a global.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Mut {
    Const,
    Var,
}

impl Decode for Mut {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        match decoder.read_byte()? {
            0x00 => Ok(Self::Const),
            0x01 => Ok(Self::Var),
            _ => Err(ParseError::InvalidTag),
        }
    }
}

/// An error that can occur when operating on a [`GlobalInst`] from the host.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum GlobalError {
    #[error("value type mismatch")]
    TypeMismatch,
    #[error("global is immutable")]
    Immutable,
}

/// A global instance in a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct GlobalInst {
    type_: GlobalType,
    value: Value,
}

impl GlobalInst {
    pub(crate) fn new(type_: GlobalType, val: Val) -> Result<Self, GlobalError> {
        if val.type_() != type_.val {
            return Err(GlobalError::TypeMismatch);
        }
        Ok(Self {
            type_,
            value: val.to_value(),
        })
    }

    pub fn type_(&self) -> GlobalType {
        self.type_
    }

    pub fn get(&self) -> Val {
        Val::from_value(self.type_.val, self.value)
    }

    /// Sets the value of this global.
    ///
    /// # Errors
    ///
    /// If the global is immutable, or `val` has the wrong type.
    pub fn set(&mut self, val: Val) -> Result<(), GlobalError> {
        if self.type_.mut_ != Mut::Var {
            return Err(GlobalError::Immutable);
        }
        if val.type_() != self.type_.val {
            return Err(GlobalError::TypeMismatch);
        }
        self.value = val.to_value();
        Ok(())
    }

    pub(crate) fn value(&self) -> Value {
        self.value
    }

    /// Writes the raw value, bypassing the mutability check. Used by `global.set` and by
    /// initialization.
    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
    }
}
