use {
    crate::{
        decode::{Decode, Decoder, ParseError},
        instance::ModuleInstance,
        index::MemIdx,
        module::Code,
        store::{MemAddr, Store},
        trap::Trap,
        val::{Val, ValType},
    },
    std::{fmt, sync::Arc},
};

/// The type of a function: its parameter and result types.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct FuncType {
    params_results: Arc<[ValType]>,
    param_count: usize,
}

impl FuncType {
    /// Creates a new [`FuncType`] with the given parameters and results.
    pub fn new(
        params: impl IntoIterator<Item = ValType>,
        results: impl IntoIterator<Item = ValType>,
    ) -> Self {
        let mut params_results = params.into_iter().collect::<Vec<_>>();
        let param_count = params_results.len();
        params_results.extend(results);
        Self {
            params_results: params_results.into(),
            param_count,
        }
    }

    /// Returns the parameters of this [`FuncType`].
    pub fn params(&self) -> &[ValType] {
        &self.params_results[..self.param_count]
    }

    /// Returns the results of this [`FuncType`].
    pub fn results(&self) -> &[ValType] {
        &self.params_results[self.param_count..]
    }
}

impl Decode for FuncType {
    fn decode(decoder: &mut Decoder<'_>) -> Result<Self, ParseError> {
        if decoder.read_byte()? != 0x60 {
            return Err(ParseError::InvalidTag);
        }
        let mut params_results: Vec<ValType> = decoder.decode_vec()?;
        let param_count = params_results.len();
        params_results.extend(decoder.decode_vec::<ValType>()?);
        Ok(Self {
            params_results: params_results.into(),
            param_count,
        })
    }
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, type_) in self.params().iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", type_)?;
        }
        write!(f, ") -> (")?;
        for (index, type_) in self.results().iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", type_)?;
        }
        write!(f, ")")
    }
}

/// A function instance in a [`Store`].
#[derive(Debug)]
pub enum FuncInst {
    Wasm(WasmFunc),
    Host(HostFunc),
}

impl FuncInst {
    /// Returns the [`FuncType`] of this function.
    pub fn type_(&self) -> &FuncType {
        match self {
            Self::Wasm(func) => &func.type_,
            Self::Host(func) => &func.type_,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }
}

/// A function defined by a module.
#[derive(Debug)]
pub struct WasmFunc {
    type_: FuncType,
    instance: Arc<ModuleInstance>,
    code_idx: usize,
    call_count: u32,
}

impl WasmFunc {
    pub(crate) fn new(type_: FuncType, instance: Arc<ModuleInstance>, code_idx: usize) -> Self {
        Self {
            type_,
            instance,
            code_idx,
            call_count: 0,
        }
    }

    /// Returns the instance this function was defined in.
    pub fn instance(&self) -> &Arc<ModuleInstance> {
        &self.instance
    }

    /// Returns the position of this function's body in the code section of its module.
    pub fn code_idx(&self) -> usize {
        self.code_idx
    }

    pub(crate) fn code(&self) -> &Code {
        &self.instance.module().code()[self.code_idx]
    }

    /// Records a call and returns how many calls preceded it.
    pub(crate) fn record_call(&mut self) -> u32 {
        let count = self.call_count;
        self.call_count = self.call_count.saturating_add(1);
        count
    }
}

type HostCallback = dyn Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + Send + Sync;

/// A function implemented by the host.
#[derive(Clone)]
pub struct HostFunc {
    name: String,
    type_: FuncType,
    callback: Arc<HostCallback>,
}

impl HostFunc {
    pub(crate) fn new<F>(name: impl Into<String>, type_: FuncType, callback: F) -> Self
    where
        F: Fn(&mut Caller<'_>, &[Val]) -> Result<Vec<Val>, Trap> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            type_,
            callback: Arc::new(callback),
        }
    }

    /// Returns the name this function was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn callback(&self) -> Arc<HostCallback> {
        self.callback.clone()
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc")
            .field("name", &self.name)
            .field("type_", &self.type_)
            .finish_non_exhaustive()
    }
}

/// The context a host function runs in.
#[derive(Debug)]
pub struct Caller<'a> {
    store: &'a mut Store,
    instance: Option<Arc<ModuleInstance>>,
}

impl<'a> Caller<'a> {
    pub(crate) fn new(store: &'a mut Store, instance: Option<Arc<ModuleInstance>>) -> Self {
        Self { store, instance }
    }

    pub fn store(&self) -> &Store {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut *self.store
    }

    /// Returns the instance of the Wasm function that made the call, if any.
    pub fn instance(&self) -> Option<&Arc<ModuleInstance>> {
        self.instance.as_ref()
    }

    /// Returns the address of the given memory of the calling instance.
    pub fn mem_addr(&self, idx: MemIdx) -> Option<MemAddr> {
        self.instance.as_ref()?.mem_addr(idx)
    }
}
