//! Definition loaders
//!
//! Each definition kind has a loader that checks a loaded module against the
//! shape that kind requires and turns it into a [`Binding`].

use serde_json::Value;
use std::sync::Arc;

use quiver_common::{DefinitionDescriptor, DefinitionKind, Error, Result};

use crate::module::{Export, LoadedModule};
use crate::namespace::Capability;

/// A capability ready to install under a name
#[derive(Clone)]
pub struct Binding {
    pub name: String,
    pub capability: Capability,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding").field("name", &self.name).finish()
    }
}

/// Binds loaded modules of one definition kind
pub trait DefinitionLoader: Send + Sync {
    fn bind(&self, descriptor: &DefinitionDescriptor, module: &LoadedModule) -> Result<Binding>;
}

/// Commands and element commands.
///
/// Accepts a function (a class with a `command()` method counts), or an
/// object with a `command` method. Arguments are passed through as given.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandLoader;

/// Assertions and expectations.
///
/// Accepts an object with an `assertion` method, or a function. The
/// capability receives a single `{negate, args}` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssertionLoader;

/// Page objects; calling one returns the page object's data
#[derive(Debug, Default, Clone, Copy)]
pub struct PageObjectLoader;

/// Loader for a definition kind
pub fn loader_for(kind: DefinitionKind) -> &'static dyn DefinitionLoader {
    match kind {
        DefinitionKind::Command | DefinitionKind::ElementCommand => &CommandLoader,
        DefinitionKind::Assertion | DefinitionKind::Expectation => &AssertionLoader,
        DefinitionKind::PageObject => &PageObjectLoader,
    }
}

impl DefinitionLoader for CommandLoader {
    fn bind(&self, descriptor: &DefinitionDescriptor, module: &LoadedModule) -> Result<Binding> {
        let capability = member_or_self(&module.exports, "command").ok_or_else(|| {
            Error::invalid_export(
                &module.path,
                format!(
                    "{} `{}` must export a function or an object with a `command` method",
                    descriptor.kind,
                    descriptor.command_name()
                ),
            )
        })?;

        Ok(Binding {
            name: descriptor.command_name().to_string(),
            capability,
        })
    }
}

impl DefinitionLoader for AssertionLoader {
    fn bind(&self, descriptor: &DefinitionDescriptor, module: &LoadedModule) -> Result<Binding> {
        let capability = member_or_self(&module.exports, "assertion").ok_or_else(|| {
            Error::invalid_export(
                &module.path,
                format!(
                    "{} `{}` must export a function or an object with an `assertion` method",
                    descriptor.kind,
                    descriptor.command_name()
                ),
            )
        })?;

        Ok(Binding {
            name: descriptor.command_name().to_string(),
            capability,
        })
    }
}

impl DefinitionLoader for PageObjectLoader {
    fn bind(&self, descriptor: &DefinitionDescriptor, module: &LoadedModule) -> Result<Binding> {
        let capability: Capability = match &module.exports {
            Export::Function(func) => func.clone(),
            Export::Object(_) => {
                let data = module.exports.to_value();
                Arc::new(move |_args: Vec<Value>| Ok::<_, Error>(data.clone()))
            }
            _ => {
                return Err(Error::invalid_export(
                    &module.path,
                    format!(
                        "page object `{}` must be an object",
                        descriptor.command_name()
                    ),
                ))
            }
        };

        Ok(Binding {
            name: descriptor.command_name().to_string(),
            capability,
        })
    }
}

fn member_or_self(exports: &Export, member: &str) -> Option<Capability> {
    match exports {
        Export::Function(func) => Some(func.clone()),
        Export::Object(_) => exports.get(member).and_then(Export::as_function).cloned(),
        _ => None,
    }
}
