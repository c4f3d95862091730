use {
    crate::{
        data::DataInst,
        elem::ElemInst,
        extern_val::{ExternType, ExternVal},
        func::{Caller, FuncInst, FuncType, HostFunc},
        global::{GlobalError, GlobalInst, GlobalType},
        mem::{MemInst, MemType},
        table::{TableError, TableInst, TableType},
        tag::TagInst,
        trap::Trap,
        val::{Ref, Val},
    },
    std::fmt,
};

macro_rules! define_addr {
    ($($(#[$attr:meta])* $Addr:ident;)*) => {
        $(
            $(#[$attr])*
            #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
            #[repr(transparent)]
            pub struct $Addr(u32);

            impl $Addr {
                pub const fn new(value: u32) -> Self {
                    Self(value)
                }

                pub const fn to_u32(self) -> u32 {
                    self.0
                }

                pub(crate) fn to_usize(self) -> usize {
                    self.0 as usize
                }
            }

            impl fmt::Display for $Addr {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

define_addr! {
    /// The address of a function instance in a [`Store`].
    FuncAddr;
    /// The address of a table instance in a [`Store`].
    TableAddr;
    /// The address of a memory instance in a [`Store`].
    MemAddr;
    /// The address of a global instance in a [`Store`].
    GlobalAddr;
    /// The address of a tag instance in a [`Store`].
    TagAddr;
    /// The address of an element instance in a [`Store`].
    ElemAddr;
    /// The address of a data instance in a [`Store`].
    DataAddr;
    /// An opaque host value carried by an `externref`.
    ExternAddr;
}

/// The owner of every runtime object.
///
/// Objects are only ever appended, never removed, so an address stays valid for the lifetime of
/// the [`Store`]. Module instances refer to objects by address only, which lets several instances
/// share one imported memory, table or global.
#[derive(Debug, Default)]
pub struct Store {
    funcs: Vec<FuncInst>,
    tables: Vec<TableInst>,
    mems: Vec<MemInst>,
    globals: Vec<GlobalInst>,
    tags: Vec<TagInst>,
    elems: Vec<ElemInst>,
    datas: Vec<DataInst>,
}

fn next_addr<T>(entities: &[T]) -> u32 {
    u32::try_from(entities.len()).expect("store address space exhausted")
}

impl Store {
    /// Creates an empty [`Store`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a host function with the given [`FuncType`].
    ///
    /// The callback receives the arguments as [`Val`]s and must return values matching the
    /// result types, or a [`Trap`].
    pub fn alloc_host_func<F>(&mut self, name: impl Into<String>, type_: FuncType, callback: F) -> FuncAddr
    where
        F: Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + Send + Sync + 'static,
    {
        self.alloc_func(FuncInst::Host(HostFunc::new(name, type_, callback)))
    }

    pub(crate) fn alloc_func(&mut self, func: FuncInst) -> FuncAddr {
        let addr = FuncAddr(next_addr(&self.funcs));
        self.funcs.push(func);
        addr
    }

    /// Allocates a table with the given [`TableType`], with every element set to `init`.
    ///
    /// # Errors
    ///
    /// If the type of `init` does not match the element type of the table.
    pub fn alloc_table(&mut self, type_: TableType, init: Ref) -> Result<TableAddr, TableError> {
        let table = TableInst::new(type_, init)?;
        let addr = TableAddr(next_addr(&self.tables));
        self.tables.push(table);
        Ok(addr)
    }

    /// Allocates a zero-filled memory with the given [`MemType`].
    pub fn alloc_mem(&mut self, type_: MemType) -> MemAddr {
        let addr = MemAddr(next_addr(&self.mems));
        self.mems.push(MemInst::new(type_));
        addr
    }

    /// Allocates a global with the given [`GlobalType`] and initial value.
    ///
    /// # Errors
    ///
    /// If the type of `val` does not match the value type of the global.
    pub fn alloc_global(&mut self, type_: GlobalType, val: Val) -> Result<GlobalAddr, GlobalError> {
        let global = GlobalInst::new(type_, val)?;
        let addr = GlobalAddr(next_addr(&self.globals));
        self.globals.push(global);
        Ok(addr)
    }

    /// Allocates an exception tag whose payload has the parameter types of `type_`.
    pub fn alloc_tag(&mut self, attribute: u8, type_: FuncType) -> TagAddr {
        let addr = TagAddr(next_addr(&self.tags));
        self.tags.push(TagInst::new(attribute, type_));
        addr
    }

    pub(crate) fn alloc_elem(&mut self, elem: ElemInst) -> ElemAddr {
        let addr = ElemAddr(next_addr(&self.elems));
        self.elems.push(elem);
        addr
    }

    pub(crate) fn alloc_data(&mut self, data: DataInst) -> DataAddr {
        let addr = DataAddr(next_addr(&self.datas));
        self.datas.push(data);
        addr
    }

    pub fn func(&self, addr: FuncAddr) -> Option<&FuncInst> {
        self.funcs.get(addr.to_usize())
    }

    pub(crate) fn func_mut(&mut self, addr: FuncAddr) -> Option<&mut FuncInst> {
        self.funcs.get_mut(addr.to_usize())
    }

    pub fn table(&self, addr: TableAddr) -> Option<&TableInst> {
        self.tables.get(addr.to_usize())
    }

    pub fn table_mut(&mut self, addr: TableAddr) -> Option<&mut TableInst> {
        self.tables.get_mut(addr.to_usize())
    }

    pub fn mem(&self, addr: MemAddr) -> Option<&MemInst> {
        self.mems.get(addr.to_usize())
    }

    pub fn mem_mut(&mut self, addr: MemAddr) -> Option<&mut MemInst> {
        self.mems.get_mut(addr.to_usize())
    }

    pub fn global(&self, addr: GlobalAddr) -> Option<&GlobalInst> {
        self.globals.get(addr.to_usize())
    }

    pub fn global_mut(&mut self, addr: GlobalAddr) -> Option<&mut GlobalInst> {
        self.globals.get_mut(addr.to_usize())
    }

    pub fn tag(&self, addr: TagAddr) -> Option<&TagInst> {
        self.tags.get(addr.to_usize())
    }

    pub(crate) fn elem(&self, addr: ElemAddr) -> Option<&ElemInst> {
        self.elems.get(addr.to_usize())
    }

    pub(crate) fn elem_mut(&mut self, addr: ElemAddr) -> Option<&mut ElemInst> {
        self.elems.get_mut(addr.to_usize())
    }

    pub(crate) fn data(&self, addr: DataAddr) -> Option<&DataInst> {
        self.datas.get(addr.to_usize())
    }

    pub(crate) fn data_mut(&mut self, addr: DataAddr) -> Option<&mut DataInst> {
        self.datas.get_mut(addr.to_usize())
    }

    /// Borrows a table mutably together with an element segment.
    pub(crate) fn table_and_elem_mut(
        &mut self,
        table: TableAddr,
        elem: ElemAddr,
    ) -> Option<(&mut TableInst, &ElemInst)> {
        Some((
            self.tables.get_mut(table.to_usize())?,
            self.elems.get(elem.to_usize())?,
        ))
    }

    /// Borrows a memory mutably together with a data segment.
    pub(crate) fn mem_and_data_mut(&mut self, mem: MemAddr, data: DataAddr) -> Option<(&mut MemInst, &DataInst)> {
        Some((
            self.mems.get_mut(mem.to_usize())?,
            self.datas.get(data.to_usize())?,
        ))
    }

    /// Borrows two distinct tables, the first one mutably.
    pub(crate) fn table_pair_mut(&mut self, dst: TableAddr, src: TableAddr) -> Option<(&mut TableInst, &TableInst)> {
        pair_mut(&mut self.tables, dst.to_usize(), src.to_usize())
    }

    /// Borrows two distinct memories, the first one mutably.
    pub(crate) fn mem_pair_mut(&mut self, dst: MemAddr, src: MemAddr) -> Option<(&mut MemInst, &MemInst)> {
        pair_mut(&mut self.mems, dst.to_usize(), src.to_usize())
    }

    pub fn func_count(&self) -> usize {
        self.funcs.len()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn mem_count(&self) -> usize {
        self.mems.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    /// Returns the [`ExternType`] of the object behind `val`, or `None` if the address is not
    /// allocated in this [`Store`].
    pub fn extern_type(&self, val: ExternVal) -> Option<ExternType> {
        Some(match val {
            ExternVal::Func(addr) => ExternType::Func(self.func(addr)?.type_().clone()),
            ExternVal::Table(addr) => ExternType::Table(self.table(addr)?.type_()),
            ExternVal::Mem(addr) => ExternType::Mem(self.mem(addr)?.type_()),
            ExternVal::Global(addr) => ExternType::Global(self.global(addr)?.type_()),
            ExternVal::Tag(addr) => {
                let tag = self.tag(addr)?;
                ExternType::Tag {
                    attribute: tag.attribute(),
                    type_: tag.type_().clone(),
                }
            }
        })
    }
}

fn pair_mut<T>(items: &mut [T], dst: usize, src: usize) -> Option<(&mut T, &T)> {
    if dst == src || dst.max(src) >= items.len() {
        return None;
    }
    if dst < src {
        let (head, tail) = items.split_at_mut(src);
        Some((&mut head[dst], &tail[0]))
    } else {
        let (head, tail) = items.split_at_mut(dst);
        Some((&mut tail[0], &head[src]))
    }
}
