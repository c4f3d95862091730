use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        limits::Limits,
        trap::Trap,
        val::{Ref, RefType},
    },
    std::fmt,
    thiserror::Error,
};

/// Tables never grow beyond this many elements, whatever their declared maximum.
const MAX_SIZE: u32 = 10_000_000;

/// The type of a table.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TableType {
    pub elem: RefType,
    pub limits: Limits,
}

impl TableType {
    pub fn new(elem: RefType, min: u32, max: Option<u32>) -> Self {
        Self {
            elem,
            limits: Limits { min, max },
        }
    }

    pub fn is_valid(self) -> bool {
        self.limits.is_valid(u32::MAX)
    }
}

impl Decode for TableType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        Ok(Self {
            elem: decoder.decode()?,
            limits: decoder.decode()?,
        })
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.limits, self.elem)
    }
}

/// An error that can occur when operating on a [`TableInst`] from the host.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum TableError {
    #[error("element type mismatch")]
    ElemTypeMismatch,
    #[error("table index out of bounds")]
    OutOfBounds,
}

/// A table instance in a [`Store`](crate::Store).
#[derive(Clone, Debug)]
pub struct TableInst {
    type_: TableType,
    elems: Vec<Ref>,
}

impl TableInst {
    pub(crate) fn new(type_: TableType, init: Ref) -> Result<Self, TableError> {
        if init.type_() != type_.elem {
            return Err(TableError::ElemTypeMismatch);
        }
        Ok(Self {
            type_,
            elems: vec![init; type_.limits.min as usize],
        })
    }

    /// Returns the current type of this table. Its minimum is the current size.
    pub fn type_(&self) -> TableType {
        TableType {
            elem: self.type_.elem,
            limits: Limits {
                min: self.size(),
                max: self.type_.limits.max,
            },
        }
    }

    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn get(&self, idx: u32) -> Option<Ref> {
        self.elems.get(idx as usize).copied()
    }

    /// Sets the element at `idx`.
    ///
    /// # Errors
    ///
    /// If `idx` is out of bounds, or `val` has the wrong type.
    pub fn set(&mut self, idx: u32, val: Ref) -> Result<(), TableError> {
        if val.type_() != self.type_.elem {
            return Err(TableError::ElemTypeMismatch);
        }
        let elem = self
            .elems
            .get_mut(idx as usize)
            .ok_or(TableError::OutOfBounds)?;
        *elem = val;
        Ok(())
    }

    /// Grows this table by `count` elements set to `init`.
    ///
    /// Returns the previous size, or `None` if the table cannot grow that much.
    pub fn grow(&mut self, count: u32, init: Ref) -> Option<u32> {
        let old_size = self.size();
        let new_size = old_size.checked_add(count)?;
        if new_size > self.type_.limits.max.unwrap_or(MAX_SIZE).min(MAX_SIZE) {
            return None;
        }
        self.elems.try_reserve(count as usize).ok()?;
        self.elems.resize(new_size as usize, init);
        Some(old_size)
    }

    pub(crate) fn fill(&mut self, dst: u32, val: Ref, count: u32) -> Result<(), Trap> {
        let range = bounds(dst, count, self.elems.len())?;
        self.elems[range].fill(val);
        Ok(())
    }

    pub(crate) fn copy_within(&mut self, dst: u32, src: u32, count: u32) -> Result<(), Trap> {
        let dst_range = bounds(dst, count, self.elems.len())?;
        let src_range = bounds(src, count, self.elems.len())?;
        self.elems.copy_within(src_range, dst_range.start);
        Ok(())
    }

    pub(crate) fn copy_from(&mut self, dst: u32, src_table: &TableInst, src: u32, count: u32) -> Result<(), Trap> {
        self.init(dst, &src_table.elems, src, count)
    }

    /// Copies `count` references from `src_elems` at `src` into this table at `dst`.
    pub(crate) fn init(&mut self, dst: u32, src_elems: &[Ref], src: u32, count: u32) -> Result<(), Trap> {
        let dst_range = bounds(dst, count, self.elems.len())?;
        let src_range = bounds(src, count, src_elems.len())?;
        self.elems[dst_range].copy_from_slice(&src_elems[src_range]);
        Ok(())
    }
}

fn bounds(start: u32, count: u32, len: usize) -> Result<std::ops::Range<usize>, Trap> {
    let end = u64::from(start) + u64::from(count);
    if end > len as u64 {
        return Err(Trap::TableOutOfBounds);
    }
    Ok(start as usize..end as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_respects_maximum() {
        let mut table = TableInst::new(TableType::new(RefType::FuncRef, 1, Some(2)), Ref::Func(None)).unwrap();
        assert_eq!(table.grow(1, Ref::Func(None)), Some(1));
        assert_eq!(table.grow(1, Ref::Func(None)), None);
        assert_eq!(table.size(), 2);
    }

    #[test]
    fn out_of_bounds_fill_traps_without_writing() {
        let mut table = TableInst::new(TableType::new(RefType::ExternRef, 2, None), Ref::Extern(None)).unwrap();
        assert_eq!(
            table.fill(1, Ref::Extern(Some(crate::store::ExternAddr::new(7))), 2),
            Err(Trap::TableOutOfBounds)
        );
        assert_eq!(table.get(1), Some(Ref::Extern(None)));
        assert_eq!(table.fill(2, Ref::Extern(None), 0), Ok(()));
    }
}
