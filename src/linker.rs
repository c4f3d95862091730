use {
    crate::{
        extern_val::{ExternType, ExternVal},
        instance::ModuleInstance,
        module::Module,
        store::Store,
    },
    std::{collections::HashMap, fmt, sync::Arc},
    thiserror::Error,
    tracing::debug,
};

/// The two-level name of an import: the module it comes from and the item within it.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ImportName {
    pub module: String,
    pub name: String,
}

impl ImportName {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ImportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.name)
    }
}

/// Which candidate wins when more than one call to [`Linker::link`] can satisfy an import.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum ResolutionPolicy {
    /// The first matching candidate stays resolved.
    #[default]
    KeepFirst,
    /// A later matching candidate replaces an earlier one.
    PreferLatest,
}

/// An error returned by [`Linker::finish`] when some imports are still unresolved.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("missing imports: {}", DisplayNames(missing_imports))]
pub struct LinkError {
    pub missing_imports: Vec<ImportName>,
}

struct DisplayNames<'a>(&'a [ImportName]);

impl fmt::Display for DisplayNames<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, name) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", name)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Import {
    name: ImportName,
    /// `None` if the import refers to a type the module does not define. Such an import can
    /// never be resolved.
    type_: Option<ExternType>,
    resolved: Option<ExternVal>,
}

/// Resolves the imports of a [`Module`] against external values offered in one or more steps.
#[derive(Clone, Debug)]
pub struct Linker {
    policy: ResolutionPolicy,
    imports: Vec<Import>,
}

impl Linker {
    /// Creates a [`Linker`] for the imports of `module`, none of them resolved yet.
    pub fn new(module: &Arc<Module>) -> Self {
        let imports = module
            .imports()
            .iter()
            .map(|import| {
                let type_ = module.import_type(&import.desc);
                Import {
                    name: ImportName::new(import.module.clone(), import.name.clone()),
                    type_,
                    resolved: None,
                }
            })
            .collect();
        Self {
            policy: ResolutionPolicy::default(),
            imports,
        }
    }

    /// Sets the [`ResolutionPolicy`]. Defaults to [`ResolutionPolicy::KeepFirst`].
    pub fn with_policy(mut self, policy: ResolutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Offers external values keyed by import name.
    ///
    /// An import is resolved by a value with the same name whose type in `store` matches the
    /// type the import requires.
    pub fn link(&mut self, store: &Store, externs: &HashMap<ImportName, ExternVal>) {
        self.resolve(store, |name| externs.get(name).copied());
    }

    /// Offers the exports of `instance` under the module name `module_name`.
    pub fn link_instance(&mut self, store: &Store, module_name: &str, instance: &ModuleInstance) {
        self.resolve(store, |name| {
            if name.module != module_name {
                return None;
            }
            instance.export(&name.name)
        });
    }

    fn resolve(&mut self, store: &Store, mut lookup: impl FnMut(&ImportName) -> Option<ExternVal>) {
        let mut resolved_count = 0;
        for import in &mut self.imports {
            if import.resolved.is_some() && self.policy == ResolutionPolicy::KeepFirst {
                continue;
            }
            let Some(required) = &import.type_ else {
                continue;
            };
            let Some(val) = lookup(&import.name) else {
                continue;
            };
            let matches = store
                .extern_type(val)
                .is_some_and(|actual| actual.matches(required));
            if matches {
                import.resolved = Some(val);
                resolved_count += 1;
            } else {
                debug!(import = %import.name, "candidate does not match the import type");
            }
        }
        debug!(resolved_count, "linked externals");
    }

    /// Returns the imports that are not resolved yet, with the type each one requires.
    pub fn unresolved_imports(&self) -> impl Iterator<Item = (&ImportName, Option<&ExternType>)> {
        self.imports
            .iter()
            .filter(|import| import.resolved.is_none())
            .map(|import| (&import.name, import.type_.as_ref()))
    }

    /// Returns one resolved value per import, in declaration order.
    ///
    /// # Errors
    ///
    /// If any import is still unresolved. The error lists all of them.
    pub fn finish(&self) -> Result<Vec<ExternVal>, LinkError> {
        let missing_imports: Vec<ImportName> = self
            .unresolved_imports()
            .map(|(name, _)| name.clone())
            .collect();
        if !missing_imports.is_empty() {
            return Err(LinkError { missing_imports });
        }
        Ok(self
            .imports
            .iter()
            .filter_map(|import| import.resolved)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_lists_every_missing_import() {
        let error = LinkError {
            missing_imports: vec![ImportName::new("a", "b"), ImportName::new("c", "d")],
        };
        assert_eq!(error.to_string(), "missing imports: a::b, c::d");
    }

    #[test]
    fn module_without_imports_links_trivially() {
        let module = Arc::new(Module::default());
        let linker = Linker::new(&module);
        assert_eq!(linker.unresolved_imports().count(), 0);
        assert_eq!(linker.finish(), Ok(Vec::new()));
    }
}
