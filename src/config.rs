use {
    crate::hook::InstructionHook,
    std::{fmt, sync::Arc},
};

/// How function bodies are executed.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum DispatchMode {
    /// Interpret the decoded instructions one by one, passing every operand on the stack.
    Naive,
    /// Lower hot function bodies to register-assigned dispatch records.
    #[default]
    Compiled,
}

/// Settings for an [`AbstractMachine`](crate::AbstractMachine).
#[derive(Clone)]
pub struct Config {
    pub(crate) dispatch: DispatchMode,
    pub(crate) compile_threshold: u32,
    pub(crate) max_call_depth: usize,
    pub(crate) instruction_limit: Option<u64>,
    pub(crate) hook: Option<Arc<dyn InstructionHook>>,
}

impl Config {
    /// Creates a [`Config`] with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the [`DispatchMode`]. Defaults to [`DispatchMode::Compiled`].
    pub fn dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Sets how many calls a function takes before its body is compiled. `0` compiles every
    /// body on its first call. Defaults to `1`.
    pub fn compile_threshold(mut self, compile_threshold: u32) -> Self {
        self.compile_threshold = compile_threshold;
        self
    }

    /// Sets the number of nested frames after which a call traps. Defaults to 16384.
    pub fn max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Sets how many instructions a single invocation may execute. Unlimited by default.
    pub fn instruction_limit(mut self, instruction_limit: Option<u64>) -> Self {
        self.instruction_limit = instruction_limit;
        self
    }

    /// Installs a hook that is called around every executed instruction. None by default.
    pub fn instruction_hook(mut self, hook: Option<Arc<dyn InstructionHook>>) -> Self {
        self.hook = hook;
        self
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch
    }

    pub fn threshold(&self) -> u32 {
        self.compile_threshold
    }

    pub fn call_depth_limit(&self) -> usize {
        self.max_call_depth
    }

    pub fn instruction_budget(&self) -> Option<u64> {
        self.instruction_limit
    }

    pub fn has_instruction_hook(&self) -> bool {
        self.hook.is_some()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("dispatch", &self.dispatch)
            .field("compile_threshold", &self.compile_threshold)
            .field("max_call_depth", &self.max_call_depth)
            .field("instruction_limit", &self.instruction_limit)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Compiled,
            compile_threshold: 1,
            max_call_depth: 16384,
            instruction_limit: None,
            hook: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new()
            .dispatch(DispatchMode::Naive)
            .compile_threshold(0)
            .max_call_depth(8)
            .instruction_limit(Some(100));
        assert_eq!(config.dispatch_mode(), DispatchMode::Naive);
        assert_eq!(config.threshold(), 0);
        assert_eq!(config.call_depth_limit(), 8);
        assert_eq!(config.instruction_budget(), Some(100));
        assert_eq!(Config::default().dispatch_mode(), DispatchMode::Compiled);
        assert!(!config.has_instruction_hook());
    }
}
