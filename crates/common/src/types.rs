//! Core types for Quiver

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compiled-format script extension
pub const JS_FILE_EXT: &str = "js";

/// Typed-source script extension
pub const TS_FILE_EXT: &str = "ts";

/// Extensions the scanner and loaders accept
pub const LOADABLE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx"];

/// Whether a file name carries one of the loadable script extensions
pub fn is_loadable_file(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LOADABLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Whether a file name is a typed-source dialect file
pub fn is_typed_source(file_name: &str) -> bool {
    matches!(
        Path::new(file_name).extension().and_then(|ext| ext.to_str()),
        Some("ts" | "mts" | "cts" | "tsx")
    )
}

/// Kind of definition a file provides; selects the loader that binds it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Command,
    ElementCommand,
    Assertion,
    Expectation,
    PageObject,
}

impl Default for DefinitionKind {
    fn default() -> Self {
        Self::Command
    }
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefinitionKind::Command => write!(f, "command"),
            DefinitionKind::ElementCommand => write!(f, "element-command"),
            DefinitionKind::Assertion => write!(f, "assertion"),
            DefinitionKind::Expectation => write!(f, "expectation"),
            DefinitionKind::PageObject => write!(f, "page-object"),
        }
    }
}

/// Failure policy of one namespace in a dual namespace pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NamespacePolicy {
    pub name: &'static str,
    pub abort_on_failure: bool,
}

/// `assert` aborts the chain, `verify` records and continues
pub const ASSERTION_NAMESPACES: &[NamespacePolicy] = &[
    NamespacePolicy {
        name: "assert",
        abort_on_failure: true,
    },
    NamespacePolicy {
        name: "verify",
        abort_on_failure: false,
    },
];

/// `expect` aborts the chain, `should` records and continues
pub const EXPECT_NAMESPACES: &[NamespacePolicy] = &[
    NamespacePolicy {
        name: "expect",
        abort_on_failure: true,
    },
    NamespacePolicy {
        name: "should",
        abort_on_failure: false,
    },
];

/// A fixed built-in definition folder
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuiltinCategory {
    pub key: &'static str,
    /// Folder relative to the built-ins root
    pub dir_path: &'static str,
    pub protocol: bool,
    pub element: bool,
    pub kind: DefinitionKind,
    /// Empty for plain command folders
    pub namespaces: &'static [NamespacePolicy],
}

/// Built-in categories in registration order
pub const BUILTIN_CATEGORIES: &[BuiltinCategory] = &[
    BuiltinCategory {
        key: "protocolActions",
        dir_path: "protocol",
        protocol: true,
        element: false,
        kind: DefinitionKind::Command,
        namespaces: &[],
    },
    BuiltinCategory {
        key: "clientCommands",
        dir_path: "client-commands",
        protocol: false,
        element: false,
        kind: DefinitionKind::Command,
        namespaces: &[],
    },
    BuiltinCategory {
        key: "elementCommands",
        dir_path: "element-commands",
        protocol: false,
        element: true,
        kind: DefinitionKind::ElementCommand,
        namespaces: &[],
    },
    BuiltinCategory {
        key: "assertions",
        dir_path: "assertions",
        protocol: false,
        element: true,
        kind: DefinitionKind::Assertion,
        namespaces: ASSERTION_NAMESPACES,
    },
    BuiltinCategory {
        key: "expect",
        dir_path: "expect",
        protocol: false,
        element: true,
        kind: DefinitionKind::Expectation,
        namespaces: EXPECT_NAMESPACES,
    },
];

/// Metadata for one discovered extension source file, prior to binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefinitionDescriptor {
    pub dir_path: PathBuf,
    pub file_name: String,
    /// Namespace segments, outermost first
    pub namespace: Vec<String>,
    pub is_user_defined: bool,
    pub is_protocol_command: bool,
    pub is_element_command: bool,
    pub abort_on_failure: bool,
    pub kind: DefinitionKind,
}

impl DefinitionDescriptor {
    pub fn new(dir_path: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir_path: dir_path.into(),
            file_name: file_name.into(),
            namespace: Vec::new(),
            is_user_defined: false,
            is_protocol_command: false,
            is_element_command: false,
            abort_on_failure: false,
            kind: DefinitionKind::default(),
        }
    }

    pub fn with_namespace(mut self, namespace: Vec<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_kind(mut self, kind: DefinitionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn user_defined(mut self, is_user_defined: bool) -> Self {
        self.is_user_defined = is_user_defined;
        self
    }

    pub fn full_path(&self) -> PathBuf {
        self.dir_path.join(&self.file_name)
    }

    /// Name the definition is installed under: the file name without extension
    pub fn command_name(&self) -> &str {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.file_name)
    }

    pub fn is_typed_source(&self) -> bool {
        is_typed_source(&self.file_name)
    }

    /// Path of the compiled-format sibling with the same base name
    pub fn compiled_sibling(&self) -> PathBuf {
        self.dir_path
            .join(format!("{}.{}", self.command_name(), JS_FILE_EXT))
    }
}
