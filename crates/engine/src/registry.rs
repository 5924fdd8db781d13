//! Extension registry
//!
//! Composes the callable API from built-in definitions, the virtuals file,
//! plugins, user commands and assertions, and page objects, in that order.
//! Later definitions shadow earlier ones with the same name. The whole pass
//! builds into private state; the composed API is only handed out once every
//! definition loaded and bound.

use indexmap::IndexSet;
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

use quiver_common::{
    is_typed_source, DefinitionDescriptor, DefinitionKind, Error, NamespacePolicy, Result,
    Settings, ASSERTION_NAMESPACES, BUILTIN_CATEGORIES,
};

use crate::bundler::{build_blocking, Bundler};
use crate::host::ScriptHost;
use crate::loaders::loader_for;
use crate::module::{Export, LoadedModule};
use crate::namespace::{FailureLog, Namespace, Policy};
use crate::plugin::PluginResolver;
use crate::resolver::ModuleResolver;
use crate::scanner::DirectoryScanner;
use crate::virtual_test::VirtualTestSpec;

/// Namespace page objects are installed under
pub const PAGE_NAMESPACE: &str = "page";

/// Where compiled typed-source definitions are written, under the cwd
pub const COMPILED_CACHE_DIR: &str = "node_modules/.cache/quiver";

/// Cache file a typed-source definition compiles to. The name flattens the
/// source path relative to `cwd`, so distinct sources never collide.
pub fn compiled_cache_path(cwd: &Path, source: &Path) -> PathBuf {
    let relative = source.strip_prefix(cwd).unwrap_or(source);
    let mut segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if let Some(last) = segments.last_mut() {
        *last = last.replace('.', "_");
    }
    cwd.join(COMPILED_CACHE_DIR)
        .join(format!("{}.cjs", segments.join("__")))
}

/// Names of element-scoped commands, frozen after composition
#[derive(Debug, Clone, Default)]
pub struct ElementCommands {
    names: IndexSet<String>,
}

impl ElementCommands {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Result of a successful registration pass
#[derive(Debug)]
pub struct ComposedApi {
    pub root: Namespace,
    pub element_commands: Arc<ElementCommands>,
    pub virtuals: Arc<Vec<VirtualTestSpec>>,
    pub failures: FailureLog,
}

impl ComposedApi {
    pub fn is_element_command(&self, name: &str) -> bool {
        self.element_commands.contains(name)
    }

    pub fn namespace(&self, path: &str) -> Option<&Namespace> {
        self.root.at(path)
    }

    /// Call a method by dotted path. A `not` segment right before the method
    /// name selects the negation view, as in `assert.not.visible`.
    pub fn call(&self, path: &str, args: Vec<Value>) -> Result<Value> {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((method, parents)) = segments.split_last() else {
            return Err(Error::UnknownMethod {
                namespace: String::new(),
                method: path.to_string(),
                negated: false,
            });
        };

        let (parents, negated) = match parents.split_last() {
            Some((&"not", rest)) => (rest, true),
            _ => (parents, false),
        };

        let mut namespace = &self.root;
        for (depth, segment) in parents.iter().enumerate() {
            namespace = namespace
                .child(segment)
                .ok_or_else(|| Error::UnknownMethod {
                    namespace: parents[..depth].join("."),
                    method: segment.to_string(),
                    negated: false,
                })?;
        }

        if negated {
            namespace.not().call(method, args)
        } else {
            namespace.call(method, args)
        }
    }

    /// Virtual suite declarations that apply to `path`
    pub fn virtuals_for<'a>(&'a self, path: &'a Path) -> impl Iterator<Item = &'a VirtualTestSpec> {
        self.virtuals.iter().filter(move |spec| spec.matches(path))
    }
}

/// Mutable state of one registration pass
struct RegistryState {
    root: Namespace,
    element_commands: IndexSet<String>,
    virtuals: Vec<VirtualTestSpec>,
    failures: FailureLog,
}

impl RegistryState {
    fn new() -> Self {
        let failures = FailureLog::new();
        Self {
            root: Namespace::root(failures.clone()),
            element_commands: IndexSet::new(),
            virtuals: Vec::new(),
            failures,
        }
    }

    fn freeze(self) -> ComposedApi {
        ComposedApi {
            root: self.root,
            element_commands: Arc::new(ElementCommands {
                names: self.element_commands,
            }),
            virtuals: Arc::new(self.virtuals),
            failures: self.failures,
        }
    }
}

/// Drives discovery, loading and binding of every extension definition
pub struct ExtensionRegistry {
    settings: Settings,
    cwd: PathBuf,
    resolver: ModuleResolver,
    scanner: DirectoryScanner,
    plugins: PluginResolver,
    bundler: Option<Arc<dyn Bundler>>,
}

impl ExtensionRegistry {
    pub fn new(settings: Settings, host: Arc<dyn ScriptHost>) -> Self {
        let cwd = settings.cwd();
        Self {
            resolver: ModuleResolver::new(host),
            scanner: DirectoryScanner::new(settings.bundled.clone(), &cwd),
            plugins: PluginResolver::new(&cwd),
            bundler: None,
            cwd,
            settings,
        }
    }

    /// Compile typed-source modules with `bundler` before loading them.
    /// Without one they go to the host as they are.
    pub fn with_bundler(mut self, bundler: Arc<dyn Bundler>) -> Self {
        self.bundler = Some(bundler);
        self
    }

    /// Run the full registration pass
    pub fn compose(&self) -> Result<ComposedApi> {
        let mut state = RegistryState::new();

        self.load_builtins(&mut state)?;
        self.load_virtuals_file(&mut state)?;
        self.load_plugins(&mut state)?;
        self.load_sources(
            &mut state,
            &self.settings.custom_commands_path.to_vec(),
            DefinitionKind::Command,
            &[],
        )?;
        self.load_sources(
            &mut state,
            &self.settings.custom_assertions_path.to_vec(),
            DefinitionKind::Assertion,
            ASSERTION_NAMESPACES,
        )?;
        self.load_sources(
            &mut state,
            &self.settings.page_objects_path.to_vec(),
            DefinitionKind::PageObject,
            &[],
        )?;

        info!(
            "Composed API: {} root method(s), {} element command(s), {} virtual suite(s)",
            state.root.methods().count(),
            state.element_commands.len(),
            state.virtuals.len()
        );
        Ok(state.freeze())
    }

    fn load_builtins(&self, state: &mut RegistryState) -> Result<()> {
        let Some(root) = &self.settings.builtins.root else {
            debug!("No built-ins root configured");
            return Ok(());
        };
        let root = self.cwd.join(root);
        if !root.is_dir() {
            debug!("Built-ins root {} is missing", root.display());
            return Ok(());
        }

        for category in BUILTIN_CATEGORIES {
            let dir = root.join(category.dir_path);
            if !dir.is_dir() {
                trace!("No built-in {} at {}", category.key, dir.display());
                continue;
            }

            let mut descriptors = self.collect(&dir, None, category.kind, category.namespaces)?;
            for descriptor in &mut descriptors {
                descriptor.is_protocol_command = category.protocol;
                descriptor.is_element_command = category.element;
            }
            for descriptor in prefer_compiled(descriptors) {
                self.install(state, &descriptor)?;
            }
        }

        Ok(())
    }

    fn load_virtuals_file(&self, state: &mut RegistryState) -> Result<()> {
        let path = self.settings.virtuals_path();
        if !path.is_file() {
            trace!("No virtuals file at {}", path.display());
            return Ok(());
        }

        let module = self.load_module(&path)?;
        state.virtuals.extend(virtual_specs(&module.exports, &path)?);
        debug!(
            "Loaded {} virtual suite(s) from {}",
            state.virtuals.len(),
            path.display()
        );
        Ok(())
    }

    fn load_plugins(&self, state: &mut RegistryState) -> Result<()> {
        for identifier in &self.settings.plugins {
            let path = self.plugins.resolve(identifier)?;
            let plugin = self.load_module(&path)?.exports;

            if let Some(commands) = plugin.get("commands") {
                self.load_sources(state, &commands.string_list(), DefinitionKind::Command, &[])?;
            }

            if let Some(assertions) = plugin.get("assertions") {
                self.load_sources(
                    state,
                    &assertions.string_list(),
                    DefinitionKind::Assertion,
                    ASSERTION_NAMESPACES,
                )?;
            }

            if let Some(virtuals) = plugin.get("virtuals").filter(|v| !v.is_null()) {
                state.virtuals.extend(virtual_specs(virtuals, &path)?);
            }

            info!("Loaded plugin {}", identifier);
        }

        Ok(())
    }

    /// Load user-configured folders of one definition kind
    fn load_sources(
        &self,
        state: &mut RegistryState,
        sources: &[String],
        kind: DefinitionKind,
        namespaces: &[NamespacePolicy],
    ) -> Result<()> {
        let mut descriptors = Vec::new();
        for source in sources {
            let dir = self.cwd.join(source);
            let mut found = self.collect(&dir, Some(source), kind, namespaces)?;
            for descriptor in &mut found {
                descriptor.is_user_defined = true;
            }
            descriptors.extend(found);
        }

        for descriptor in prefer_compiled(descriptors) {
            self.install(state, &descriptor)?;
        }
        Ok(())
    }

    /// Descriptors for every definition file under `dir`. Families with a
    /// namespace pair yield one descriptor per namespace, placed directly in
    /// that namespace.
    fn collect(
        &self,
        dir: &Path,
        original: Option<&str>,
        kind: DefinitionKind,
        namespaces: &[NamespacePolicy],
    ) -> Result<Vec<DefinitionDescriptor>> {
        if namespaces.is_empty() {
            return Ok(self
                .scanner
                .scan(dir, original)?
                .map(|entry| {
                    DefinitionDescriptor::new(entry.dir, entry.file_name)
                        .with_namespace(entry.namespace)
                        .with_kind(kind)
                })
                .collect());
        }

        let mut descriptors = Vec::new();
        for policy in namespaces {
            for entry in self.scanner.scan(dir, original)? {
                let mut descriptor = DefinitionDescriptor::new(entry.dir, entry.file_name)
                    .with_namespace(vec![policy.name.to_string()])
                    .with_kind(kind);
                descriptor.abort_on_failure = policy.abort_on_failure;
                descriptors.push(descriptor);
            }
        }
        Ok(descriptors)
    }

    fn install(&self, state: &mut RegistryState, descriptor: &DefinitionDescriptor) -> Result<()> {
        let path = descriptor.full_path();
        let module = self.load_module(&path)?;
        let binding = loader_for(descriptor.kind).bind(descriptor, &module)?;

        let namespace = match descriptor.kind {
            DefinitionKind::PageObject => state
                .root
                .child_or_insert(PAGE_NAMESPACE, Policy::Plain)
                .ensure_path(&descriptor.namespace),
            DefinitionKind::Assertion | DefinitionKind::Expectation => {
                match descriptor.namespace.split_first() {
                    Some((head, rest)) => {
                        let policy = if descriptor.abort_on_failure {
                            Policy::Affirming
                        } else {
                            Policy::Soft
                        };
                        state.root.child_or_insert(head, policy).ensure_path(rest)
                    }
                    None => {
                        return Err(Error::Internal(format!(
                            "{} {} has no namespace",
                            descriptor.kind,
                            path.display()
                        )))
                    }
                }
            }
            DefinitionKind::Command | DefinitionKind::ElementCommand => {
                state.root.ensure_path(&descriptor.namespace)
            }
        };

        trace!(
            "Installing {} {} from {}",
            descriptor.kind,
            binding.name,
            path.display()
        );
        namespace.install(binding.name.clone(), binding.capability);

        if descriptor.is_element_command {
            state.element_commands.insert(binding.name);
        }
        Ok(())
    }

    /// Load one module, waiting for a deferred load to finish
    fn load_module(&self, path: &Path) -> Result<LoadedModule> {
        let typed = path
            .file_name()
            .is_some_and(|name| is_typed_source(&name.to_string_lossy()));
        let target = match &self.bundler {
            Some(bundler) if typed => self.compile_to_cache(bundler.as_ref(), path)?,
            _ => path.to_path_buf(),
        };
        self.resolver.load(&target)?.wait()
    }

    fn compile_to_cache(&self, bundler: &dyn Bundler, source: &Path) -> Result<PathBuf> {
        let compiled = build_blocking(bundler, source)?;
        let target = compiled_cache_path(&self.cwd, source);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &compiled.text)?;
        debug!("Compiled {} to {}", source.display(), target.display());
        Ok(target)
    }
}

/// Drop typed-source files whose compiled-format sibling is also present
pub fn prefer_compiled(descriptors: Vec<DefinitionDescriptor>) -> Vec<DefinitionDescriptor> {
    let present: IndexSet<PathBuf> = descriptors.iter().map(|d| d.full_path()).collect();
    descriptors
        .into_iter()
        .filter(|d| {
            let shadowed = d.is_typed_source() && present.contains(&d.compiled_sibling());
            if shadowed {
                debug!(
                    "Skipping {}: compiled sibling present",
                    d.full_path().display()
                );
            }
            !shadowed
        })
        .collect()
}

fn virtual_specs(export: &Export, origin: &Path) -> Result<Vec<VirtualTestSpec>> {
    let items: Vec<Export> = match export {
        Export::List(items) => items.clone(),
        Export::Value(Value::Array(items)) => items.iter().cloned().map(Export::Value).collect(),
        _ => {
            return Err(Error::invalid_export(
                origin,
                "virtual suite declarations must be a list",
            ))
        }
    };

    items
        .iter()
        .map(|item| VirtualTestSpec::from_export(item, origin))
        .collect()
}
