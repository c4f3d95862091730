use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        func::FuncType,
        global::GlobalType,
        index::{FuncIdx, GlobalIdx, MemIdx, TableIdx, TagIdx, TypeIdx},
        mem::MemType,
        store::{FuncAddr, GlobalAddr, MemAddr, TableAddr, TagAddr},
        table::TableType,
        tag::TagType,
    },
    std::fmt,
};

/// A runtime object that can be imported or exported.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExternVal {
    Func(FuncAddr),
    Table(TableAddr),
    Mem(MemAddr),
    Global(GlobalAddr),
    Tag(TagAddr),
}

impl ExternVal {
    /// Converts this [`ExternVal`] to a [`FuncAddr`], if it is one.
    pub fn to_func(self) -> Option<FuncAddr> {
        match self {
            Self::Func(addr) => Some(addr),
            _ => None,
        }
    }

    /// Converts this [`ExternVal`] to a [`TableAddr`], if it is one.
    pub fn to_table(self) -> Option<TableAddr> {
        match self {
            Self::Table(addr) => Some(addr),
            _ => None,
        }
    }

    /// Converts this [`ExternVal`] to a [`MemAddr`], if it is one.
    pub fn to_mem(self) -> Option<MemAddr> {
        match self {
            Self::Mem(addr) => Some(addr),
            _ => None,
        }
    }

    /// Converts this [`ExternVal`] to a [`GlobalAddr`], if it is one.
    pub fn to_global(self) -> Option<GlobalAddr> {
        match self {
            Self::Global(addr) => Some(addr),
            _ => None,
        }
    }

    /// Converts this [`ExternVal`] to a [`TagAddr`], if it is one.
    pub fn to_tag(self) -> Option<TagAddr> {
        match self {
            Self::Tag(addr) => Some(addr),
            _ => None,
        }
    }
}

impl From<FuncAddr> for ExternVal {
    fn from(addr: FuncAddr) -> Self {
        Self::Func(addr)
    }
}

impl From<TableAddr> for ExternVal {
    fn from(addr: TableAddr) -> Self {
        Self::Table(addr)
    }
}

impl From<MemAddr> for ExternVal {
    fn from(addr: MemAddr) -> Self {
        Self::Mem(addr)
    }
}

impl From<GlobalAddr> for ExternVal {
    fn from(addr: GlobalAddr) -> Self {
        Self::Global(addr)
    }
}

impl From<TagAddr> for ExternVal {
    fn from(addr: TagAddr) -> Self {
        Self::Tag(addr)
    }
}

/// The type of an [`ExternVal`], as found in a [`Store`](crate::Store).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ExternType {
    Func(FuncType),
    Table(TableType),
    Mem(MemType),
    Global(GlobalType),
    Tag { attribute: u8, type_: FuncType },
}

impl ExternType {
    /// Returns `true` if a value of this type can be used where `required` is expected.
    ///
    /// Functions and tags must match exactly, globals must agree on value type and mutability,
    /// and tables and memories must have limits that are a subset of the required ones.
    pub fn matches(&self, required: &ExternType) -> bool {
        match (self, required) {
            (Self::Func(actual), Self::Func(required)) => actual == required,
            (Self::Table(actual), Self::Table(required)) => {
                actual.elem == required.elem && actual.limits.is_subset_of(required.limits)
            }
            (Self::Mem(actual), Self::Mem(required)) => actual.limits.is_subset_of(required.limits),
            (Self::Global(actual), Self::Global(required)) => actual == required,
            (
                Self::Tag { attribute, type_ },
                Self::Tag {
                    attribute: required_attribute,
                    type_: required_type,
                },
            ) => attribute == required_attribute && type_ == required_type,
            _ => false,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Func(_) => "function",
            Self::Table(_) => "table",
            Self::Mem(_) => "memory",
            Self::Global(_) => "global",
            Self::Tag { .. } => "tag",
        }
    }
}

impl fmt::Display for ExternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Func(type_) => write!(f, "func {}", type_),
            Self::Table(type_) => write!(f, "table {}", type_),
            Self::Mem(type_) => write!(f, "memory {}", type_),
            Self::Global(type_) => write!(f, "global {}", type_),
            Self::Tag { type_, .. } => write!(f, "tag {}", type_),
        }
    }
}

/// What an import requires, with function and tag types given by index into the type section.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ImportDesc {
    Func(TypeIdx),
    Table(TableType),
    Mem(MemType),
    Global(GlobalType),
    Tag(TagType),
}

impl Decode for ImportDesc {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let kind = decoder
            .read_byte()
            .map_err(|_| decoder.with_eof_check(ParseError::ExpectedKindTag))?;
        match kind {
            0x00 => Ok(Self::Func(decoder.decode()?)),
            0x01 => Ok(Self::Table(decoder.decode()?)),
            0x02 => Ok(Self::Mem(decoder.decode()?)),
            0x03 => Ok(Self::Global(decoder.decode()?)),
            0x04 => Ok(Self::Tag(decoder.decode()?)),
            _ => Err(ParseError::InvalidTag),
        }
    }
}

/// What an export refers to, given by index into the respective namespace.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ExportDesc {
    Func(FuncIdx),
    Table(TableIdx),
    Mem(MemIdx),
    Global(GlobalIdx),
    Tag(TagIdx),
}

impl Decode for ExportDesc {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let kind = decoder
            .read_byte()
            .map_err(|_| decoder.with_eof_check(ParseError::ExpectedKindTag))?;
        match kind {
            0x00 => Ok(Self::Func(decoder.decode()?)),
            0x01 => Ok(Self::Table(decoder.decode()?)),
            0x02 => Ok(Self::Mem(decoder.decode()?)),
            0x03 => Ok(Self::Global(decoder.decode()?)),
            0x04 => Ok(Self::Tag(decoder.decode()?)),
            _ => Err(ParseError::InvalidTag),
        }
    }
}
