use {
    crate::{
        data::Data,
        decode::{Decode, Decoder, ParseError},
        elem::Element,
        extern_val::{ExportDesc, ExternType, ImportDesc},
        func::FuncType,
        global::GlobalType,
        index::{FuncIdx, TypeIdx},
        instr::Expression,
        mem::MemType,
        table::TableType,
        tag::TagType,
        validate::{ValidationError, ValidationToken, Validator},
        val::ValType,
    },
    std::sync::{Arc, OnceLock},
    tracing::debug,
};

/// Functions may not declare more locals than this.
const MAX_LOCALS: u64 = 50_000;

/// A parsed Wasm module.
///
/// A [`Module`] is immutable once parsed, except for its [`ValidationStatus`], which only the
/// validator can set, and only once.
#[derive(Debug, Default)]
pub struct Module {
    custom_sections: Vec<CustomSection>,
    types: Vec<FuncType>,
    imports: Vec<Import>,
    functions: Vec<TypeIdx>,
    tables: Vec<TableType>,
    memories: Vec<MemType>,
    tags: Vec<TagType>,
    globals: Vec<Global>,
    exports: Vec<Export>,
    start: Option<FuncIdx>,
    elements: Vec<Element>,
    data_count: Option<u32>,
    code: Vec<Code>,
    data: Vec<Data>,
    validation_status: OnceLock<ValidationStatus>,
}

impl Module {
    /// Parses a [`Module`] from its binary encoding.
    ///
    /// # Errors
    ///
    /// If `bytes` is not a well formed Wasm binary.
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut decoder = Decoder::new(bytes);
        if decoder.read_bytes(4).ok() != Some(b"\0asm".as_slice()) {
            return Err(ParseError::InvalidModuleMagic);
        }
        if decoder.read_bytes(4).ok() != Some([1, 0, 0, 0].as_slice()) {
            return Err(ParseError::InvalidModuleVersion);
        }
        let mut module = Module::default();
        let mut last_rank = 0;
        let mut seen = [false; 14];
        while !decoder.is_at_end() {
            let id = decoder.read_byte()?;
            let size = decoder.read_size()? as usize;
            if size > decoder.remaining() {
                return Err(ParseError::SectionSizeMismatch);
            }
            let mut section = decoder.decoder(size)?;
            if id != 0 {
                let rank = section_rank(id).ok_or(ParseError::InvalidTag)?;
                if seen[id as usize] {
                    return Err(ParseError::DuplicateSection);
                }
                if rank < last_rank {
                    return Err(ParseError::SectionOutOfOrder);
                }
                seen[id as usize] = true;
                last_rank = rank;
            }
            module.decode_section(id, &mut section)?;
            if !section.is_at_end() {
                return Err(ParseError::SectionSizeMismatch);
            }
        }
        if module.functions.len() != module.code.len() {
            return Err(ParseError::InvalidSize);
        }
        if let Some(data_count) = module.data_count {
            if data_count as usize != module.data.len() {
                return Err(ParseError::InvalidSize);
            }
        }
        debug!(
            types = module.types.len(),
            imports = module.imports.len(),
            functions = module.functions.len(),
            exports = module.exports.len(),
            "parsed module"
        );
        Ok(module)
    }

    fn decode_section(&mut self, id: u8, decoder: &mut Decoder<'_>) -> Result<(), ParseError> {
        match id {
            0 => self.custom_sections.push(CustomSection {
                name: decoder.read_name()?,
                bytes: decoder.read_remaining().into(),
            }),
            1 => self.types = decoder.decode_vec()?,
            2 => self.imports = decoder.decode_vec()?,
            3 => self.functions = decoder.decode_vec()?,
            4 => self.tables = decoder.decode_vec()?,
            5 => self.memories = decoder.decode_vec()?,
            6 => self.globals = decoder.decode_vec()?,
            7 => self.exports = decoder.decode_vec()?,
            8 => self.start = Some(decoder.decode()?),
            9 => self.elements = decoder.decode_vec()?,
            10 => self.code = decoder.decode_vec()?,
            11 => self.data = decoder.decode_vec()?,
            12 => self.data_count = Some(decoder.read_size()?),
            13 => self.tags = decoder.decode_vec()?,
            _ => return Err(ParseError::InvalidTag),
        }
        Ok(())
    }

    /// Validates this [`Module`] if that has not happened yet, and returns the result.
    ///
    /// # Errors
    ///
    /// If the module is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.validation_status() {
            ValidationStatus::Unchecked => Validator::new().validate(self),
            ValidationStatus::Invalid(error) => Err(error),
            ValidationStatus::Valid => Ok(()),
        }
    }

    pub fn validation_status(&self) -> ValidationStatus {
        self.validation_status
            .get()
            .cloned()
            .unwrap_or(ValidationStatus::Unchecked)
    }

    pub(crate) fn set_validation_status(&self, status: ValidationStatus, _token: ValidationToken) {
        let _ = self.validation_status.set(status);
    }

    pub fn custom_sections(&self) -> &[CustomSection] {
        &self.custom_sections
    }

    pub fn types(&self) -> &[FuncType] {
        &self.types
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    /// Returns the type index of every function defined (not imported) by this module.
    pub fn functions(&self) -> &[TypeIdx] {
        &self.functions
    }

    pub fn tables(&self) -> &[TableType] {
        &self.tables
    }

    pub fn memories(&self) -> &[MemType] {
        &self.memories
    }

    pub fn tags(&self) -> &[TagType] {
        &self.tags
    }

    pub fn globals(&self) -> &[Global] {
        &self.globals
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    pub fn start(&self) -> Option<FuncIdx> {
        self.start
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn data_count(&self) -> Option<u32> {
        self.data_count
    }

    pub fn code(&self) -> &[Code] {
        &self.code
    }

    pub fn data(&self) -> &[Data] {
        &self.data
    }

    /// Returns the type index of every function in the function index space, imported
    /// functions first.
    pub fn func_type_idxs(&self) -> impl Iterator<Item = TypeIdx> + '_ {
        self.imports
            .iter()
            .filter_map(|import| match import.desc {
                ImportDesc::Func(type_idx) => Some(type_idx),
                _ => None,
            })
            .chain(self.functions.iter().copied())
    }

    /// Returns the [`ExternType`] an import with the given description requires.
    ///
    /// Returns `None` if the description refers to a type the module does not define.
    pub fn import_type(&self, desc: &ImportDesc) -> Option<ExternType> {
        match *desc {
            ImportDesc::Func(idx) => self.types.get(idx.to_usize()).cloned().map(ExternType::Func),
            ImportDesc::Table(type_) => Some(ExternType::Table(type_)),
            ImportDesc::Mem(type_) => Some(ExternType::Mem(type_)),
            ImportDesc::Global(type_) => Some(ExternType::Global(type_)),
            ImportDesc::Tag(type_) => self.types.get(type_.type_idx.to_usize()).map(|func_type| {
                ExternType::Tag {
                    attribute: type_.attribute,
                    type_: func_type.clone(),
                }
            }),
        }
    }

    pub(crate) fn imported_func_count(&self) -> usize {
        self.imports
            .iter()
            .filter(|import| matches!(import.desc, ImportDesc::Func(_)))
            .count()
    }
}

impl PartialEq for Module {
    fn eq(&self, other: &Self) -> bool {
        self.custom_sections == other.custom_sections
            && self.types == other.types
            && self.imports == other.imports
            && self.functions == other.functions
            && self.tables == other.tables
            && self.memories == other.memories
            && self.tags == other.tags
            && self.globals == other.globals
            && self.exports == other.exports
            && self.start == other.start
            && self.elements == other.elements
            && self.data_count == other.data_count
            && self.code == other.code
            && self.data == other.data
    }
}

fn section_rank(id: u8) -> Option<u8> {
    Some(match id {
        1 => 1,
        2 => 2,
        3 => 3,
        4 => 4,
        5 => 5,
        13 => 6,
        6 => 7,
        7 => 8,
        8 => 9,
        9 => 10,
        12 => 11,
        10 => 12,
        11 => 13,
        _ => return None,
    })
}

/// Whether a [`Module`] has been validated, and the outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationStatus {
    Unchecked,
    Invalid(ValidationError),
    Valid,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CustomSection {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub desc: ImportDesc,
}

impl Decode for Import {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            module: decoder.read_name()?,
            name: decoder.read_name()?,
            desc: decoder.decode()?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Export {
    pub name: String,
    pub desc: ExportDesc,
}

impl Decode for Export {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            name: decoder.read_name()?,
            desc: decoder.decode()?,
        })
    }
}

/// A global defined by a module, with its initializer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Global {
    pub type_: GlobalType,
    pub init: Expression,
}

impl Decode for Global {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            type_: decoder.decode()?,
            init: decoder.decode()?,
        })
    }
}

/// The body of a defined function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Code {
    /// The declared locals, one entry per local. Parameters are not included.
    pub locals: Vec<ValType>,
    pub body: Expression,
}

impl Decode for Code {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let size = decoder.read_size()? as usize;
        if size > decoder.remaining() {
            return Err(ParseError::SectionSizeMismatch);
        }
        let mut decoder = decoder.decoder(size)?;
        let groups = decoder.read_vec(|decoder| {
            let count = decoder.read_size()?;
            let type_: ValType = decoder.decode()?;
            Ok((count, type_))
        })?;
        let total = groups.iter().map(|&(count, _)| u64::from(count)).sum::<u64>();
        if total > MAX_LOCALS {
            return Err(ParseError::HugeAllocationRequested);
        }
        let mut locals = Vec::new();
        locals
            .try_reserve_exact(total as usize)
            .map_err(|_| ParseError::OutOfMemory)?;
        for (count, type_) in groups {
            locals.extend(std::iter::repeat(type_).take(count as usize));
        }
        let body = decoder.decode()?;
        if !decoder.is_at_end() {
            return Err(ParseError::SectionSizeMismatch);
        }
        Ok(Self { locals, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_header(sections: &[u8]) -> Vec<u8> {
        let mut bytes = b"\0asm\x01\0\0\0".to_vec();
        bytes.extend_from_slice(sections);
        bytes
    }

    #[test]
    fn parses_empty_module() {
        let module = Module::parse(&with_header(&[])).unwrap();
        assert!(module.types().is_empty());
        assert_eq!(module.validation_status(), ValidationStatus::Unchecked);
    }

    #[test]
    fn rejects_bad_header() {
        assert_eq!(Module::parse(b"\0asn\x01\0\0\0"), Err(ParseError::InvalidModuleMagic));
        assert_eq!(Module::parse(b"\0asm\x02\0\0\0"), Err(ParseError::InvalidModuleVersion));
        assert_eq!(Module::parse(b"\0as"), Err(ParseError::InvalidModuleMagic));
    }

    #[test]
    fn enforces_section_order() {
        // function section (empty) before type section (empty)
        let bytes = with_header(&[0x03, 0x01, 0x00, 0x01, 0x01, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::SectionOutOfOrder));
        let bytes = with_header(&[0x01, 0x01, 0x00, 0x01, 0x01, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::DuplicateSection));
        // custom sections may appear anywhere
        let bytes = with_header(&[0x01, 0x01, 0x00, 0x00, 0x02, 0x01, b'x', 0x03, 0x01, 0x00]);
        let module = Module::parse(&bytes).unwrap();
        assert_eq!(module.custom_sections()[0].name, "x");
    }

    #[test]
    fn tag_section_sits_between_memory_and_global() {
        let bytes = with_header(&[0x05, 0x01, 0x00, 0x0D, 0x01, 0x00, 0x06, 0x01, 0x00]);
        assert!(Module::parse(&bytes).is_ok());
        let bytes = with_header(&[0x06, 0x01, 0x00, 0x0D, 0x01, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::SectionOutOfOrder));
    }

    #[test]
    fn detects_section_size_mismatch() {
        // a type section declaring two bytes but containing a one byte vector
        let bytes = with_header(&[0x01, 0x02, 0x00, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::SectionSizeMismatch));
        let bytes = with_header(&[0x01, 0x05, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::SectionSizeMismatch));
    }

    #[test]
    fn function_and_code_counts_must_agree() {
        // type () -> (), one function, no code
        let bytes = with_header(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00, 0x03, 0x02, 0x01, 0x00]);
        assert_eq!(Module::parse(&bytes), Err(ParseError::InvalidSize));
    }

    #[test]
    fn parsing_is_deterministic() {
        let bytes = with_header(&[
            0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type () -> ()
            0x03, 0x02, 0x01, 0x00, // func 0 : type 0
            0x0A, 0x06, 0x01, 0x04, 0x01, 0x01, 0x7F, 0x0B, // code: local i32, end
        ]);
        let first = Module::parse(&bytes).unwrap();
        let second = Module::parse(&bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.code()[0].locals, vec![ValType::I32]);
    }
}
