use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        index::{FuncIdx, TableIdx},
        instr::{Args, Expression, Instruction, Opcode},
        val::{Ref, RefType},
    },
    std::sync::Arc,
};

/// An element segment as declared by a module.
///
/// Segments given as a vector of function indices are normalized on decoding: every index
/// becomes a `ref.func` initializer expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Element {
    pub type_: RefType,
    pub init: Vec<Expression>,
    pub mode: ElemMode,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ElemMode {
    Passive,
    Active { table: TableIdx, offset: Expression },
    Declarative,
}

impl Decode for Element {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        let flags = decoder.read_u32()?;
        if flags > 7 {
            return Err(ParseError::InvalidTag);
        }
        // Bit 0 marks a passive or declarative segment, bit 1 an explicit table index or a
        // declarative segment, and bit 2 initializers given as expressions.
        let mode = if flags & 0b001 == 0 {
            let table = if flags & 0b010 != 0 {
                decoder.decode()?
            } else {
                TableIdx::new(0)
            };
            ElemMode::Active {
                table,
                offset: decoder.decode()?,
            }
        } else if flags & 0b010 == 0 {
            ElemMode::Passive
        } else {
            ElemMode::Declarative
        };
        let uses_exprs = flags & 0b100 != 0;
        // The short active forms imply funcref and carry no type.
        let type_ = if flags & 0b011 == 0 {
            RefType::FuncRef
        } else if uses_exprs {
            decoder.decode()?
        } else {
            decode_elem_kind(decoder)?
        };
        let init = if uses_exprs {
            decoder.decode_vec()?
        } else {
            decoder.read_vec(|decoder| Ok(ref_func_expr(decoder.decode()?)))?
        };
        Ok(Self { type_, init, mode })
    }
}

fn decode_elem_kind(decoder: &mut Decoder<'_>) -> Result<RefType, ParseError> {
    match decoder.read_byte()? {
        0x00 => Ok(RefType::FuncRef),
        _ => Err(ParseError::InvalidTag),
    }
}

fn ref_func_expr(func_idx: FuncIdx) -> Expression {
    Expression::new(vec![
        Instruction::new(Opcode::RefFunc, Args::Func(func_idx)),
        Instruction::new(Opcode::End, Args::None),
    ])
}

/// An element instance: the evaluated references of a segment, until it is dropped.
#[derive(Clone, Debug)]
pub struct ElemInst {
    type_: RefType,
    refs: Arc<[Ref]>,
}

impl ElemInst {
    pub(crate) fn new(type_: RefType, refs: Vec<Ref>) -> Self {
        Self {
            type_,
            refs: refs.into(),
        }
    }

    pub fn type_(&self) -> RefType {
        self.type_
    }

    pub fn refs(&self) -> &[Ref] {
        &self.refs
    }

    pub(crate) fn drop_refs(&mut self) {
        self.refs = Arc::new([]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_index_vectors_become_ref_func_initializers() {
        // flags 1 (passive), elemkind funcref, [3, 4]
        let bytes = [0x01, 0x00, 0x02, 0x03, 0x04];
        let elem = Element::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(elem.mode, ElemMode::Passive);
        assert_eq!(elem.type_, RefType::FuncRef);
        assert_eq!(elem.init, vec![ref_func_expr(FuncIdx::new(3)), ref_func_expr(FuncIdx::new(4))]);
    }

    #[test]
    fn active_segment_with_table_index() {
        // flags 6, table 1, offset i32.const 2, externref, [ref.null extern]
        let bytes = [0x06, 0x01, 0x41, 0x02, 0x0B, 0x6F, 0x01, 0xD0, 0x6F, 0x0B];
        let elem = Element::decode(&mut Decoder::new(&bytes)).unwrap();
        assert_eq!(elem.type_, RefType::ExternRef);
        match &elem.mode {
            ElemMode::Active { table, offset } => {
                assert_eq!(*table, TableIdx::new(1));
                assert_eq!(offset.instrs()[0].i32(), 2);
            }
            mode => panic!("unexpected mode {:?}", mode),
        }
        assert_eq!(elem.init.len(), 1);
    }

    #[test]
    fn rejects_unknown_flags() {
        let bytes = [0x08];
        assert_eq!(Element::decode(&mut Decoder::new(&bytes)), Err(ParseError::InvalidTag));
    }
}
