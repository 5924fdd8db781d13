//! Quiver engine
//!
//! Turns folders of extension modules into a callable automation API and
//! turns ordinary source files into executable test suites:
//! - Scans definition folders deterministically
//! - Loads modules through either module convention of the script host
//! - Binds commands, assertions, expectations and page objects into namespaces
//! - Bundles source files and discovers their exports
//! - Synthesizes virtual test suites and runs them in a sandbox
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ExtensionRegistry::compose() -> ComposedApi                │
//! │    ├── DirectoryScanner   (folders -> ScanEntry)            │
//! │    ├── ModuleResolver     (require, import fallback)        │
//! │    ├── DefinitionLoader   (module -> Binding)               │
//! │    └── Namespace          (affirm / negate tables)          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  VirtualTestSynthesizer::run(file, spec)                    │
//! │    ├── Bundler::build      (file -> CompiledScript)         │
//! │    ├── discover_exports    (file -> ExportRecord)           │
//! │    ├── Bundler::transform  (suite text -> script)           │
//! │    └── Sandbox::execute    (script -> registrations)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ScriptHost: NodeHost (subprocess) | MemoryHost (in-process)│
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod bundler;
pub mod exports;
pub mod host;
pub mod loaders;
pub mod module;
pub mod namespace;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod scanner;
pub mod virtual_test;

pub use bundler::{Bundler, CompiledScript, EsbuildBundler, LoaderKind, TransformOptions};
pub use exports::{discover_exports, scan_exports, ExportRecord};
pub use host::{
    CollectingRegistrar, EvalOutcome, EvalUnit, MemoryHost, NodeHost, ScriptHost,
    TestRegistrar, TestRegistration,
};
pub use module::{Callable, Convention, Export, LoadedModule};
pub use namespace::{Failure, FailureLog, Invocation, Namespace, Policy};
pub use plugin::PluginResolver;
pub use registry::{ComposedApi, ElementCommands, ExtensionRegistry};
pub use resolver::{Loaded, ModuleResolver};
pub use sandbox::{compile_and_run, Sandbox};
pub use scanner::{DirectoryScanner, ScanEntry};
pub use virtual_test::{
    CaseTitle, ExportSelector, SynthesizedSuite, VirtualCase, VirtualTestSpec,
    VirtualTestSynthesizer,
};
