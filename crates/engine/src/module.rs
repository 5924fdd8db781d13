//! Loaded modules and the values they export

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_common::Result;

/// Reserved key of the nested default-export convention
pub const DEFAULT_EXPORT: &str = "default";

/// Something an extension module exports that can be called
pub trait Callable: Send + Sync {
    fn call(&self, args: Vec<Value>) -> Result<Value>;

    /// Source text of the function, when the host can provide it
    fn source(&self) -> Option<&str> {
        None
    }
}

impl<F> Callable for F
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync,
{
    fn call(&self, args: Vec<Value>) -> Result<Value> {
        self(args)
    }
}

/// One exported value
#[derive(Clone)]
pub enum Export {
    Value(Value),
    Function(Arc<dyn Callable>),
    Object(IndexMap<String, Export>),
    List(Vec<Export>),
    /// A regular expression, kept as its source
    Pattern(String),
}

impl fmt::Debug for Export {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Export::Value(value) => write!(f, "Value({})", value),
            Export::Function(func) => match func.source() {
                Some(source) => write!(f, "Function({})", source),
                None => write!(f, "Function(<native>)"),
            },
            Export::Object(entries) => f.debug_map().entries(entries.iter()).finish(),
            Export::List(items) => f.debug_list().entries(items.iter()).finish(),
            Export::Pattern(source) => write!(f, "Pattern(/{}/)", source),
        }
    }
}

impl Default for Export {
    fn default() -> Self {
        Export::Object(IndexMap::new())
    }
}

impl From<Value> for Export {
    fn from(value: Value) -> Self {
        Export::Value(value)
    }
}

impl Export {
    pub fn function<F>(func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Export::Function(Arc::new(func))
    }

    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Export)>,
    {
        Export::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn get(&self, key: &str) -> Option<&Export> {
        match self {
            Export::Object(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Arc<dyn Callable>> {
        match self {
            Export::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Export::Value(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Export]> {
        match self {
            Export::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Export::Function(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Export::Value(Value::Null))
    }

    /// Strings found in a string-or-list-of-strings export
    pub fn string_list(&self) -> Vec<String> {
        match self {
            Export::Value(Value::String(s)) => vec![s.clone()],
            Export::Value(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect(),
            Export::List(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Reach the nested `default` value if the export carries one.
    ///
    /// Returns the unwrapped value and whether unwrapping happened.
    pub fn unwrap_default(self) -> (Export, bool) {
        match self {
            Export::Object(mut entries) if entries.contains_key(DEFAULT_EXPORT) => {
                let inner = entries.shift_remove(DEFAULT_EXPORT).unwrap_or_default();
                (inner, true)
            }
            other => (other, false),
        }
    }

    /// Plain data view; functions are dropped from objects and become null in lists
    pub fn to_value(&self) -> Value {
        match self {
            Export::Value(value) => value.clone(),
            Export::Function(_) => Value::Null,
            Export::Object(entries) => Value::Object(
                entries
                    .iter()
                    .filter(|(_, v)| !v.is_function())
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect(),
            ),
            Export::List(items) => Value::Array(items.iter().map(Export::to_value).collect()),
            Export::Pattern(source) => Value::String(source.clone()),
        }
    }
}

/// Loading convention that produced a module
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    /// Eager, synchronous loader
    Require,
    /// Asynchronous loader for the other module convention
    Import,
}

/// Result of resolving one module
#[derive(Debug, Clone)]
pub struct LoadedModule {
    pub path: PathBuf,
    pub exports: Export,
    /// The loader unwrapped a nested `default` export
    pub has_default: bool,
    pub convention: Convention,
}

impl LoadedModule {
    /// Module loaded by the synchronous loader
    pub fn required(path: &Path, raw: Export) -> Self {
        let (exports, has_default) = raw.unwrap_default();
        Self {
            path: path.to_path_buf(),
            exports,
            has_default,
            convention: Convention::Require,
        }
    }

    /// Module namespace produced by the asynchronous loader; only its
    /// default export is kept, or an empty mapping when there is none.
    pub fn imported(path: &Path, namespace: Export) -> Self {
        let (exports, has_default) = namespace.unwrap_default();
        let exports = if has_default {
            exports
        } else {
            Export::default()
        };
        Self {
            path: path.to_path_buf(),
            exports,
            has_default,
            convention: Convention::Import,
        }
    }
}
