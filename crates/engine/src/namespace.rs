//! Namespaces of bound capabilities
//!
//! A namespace either passes calls straight through (command families) or
//! applies a failure policy (assertion and expectation families). Policy
//! namespaces carry two generated method tables: every installed capability
//! gets an affirm entry and a negate entry, and the negate entries are what
//! [`Namespace::not`] exposes.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use quiver_common::{Error, NamespacePolicy, Result};

use crate::module::Callable;

/// A bound capability
pub type Capability = Arc<dyn Callable>;

/// Single argument every policy-namespace method receives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub negate: bool,
    pub args: Vec<Value>,
}

/// How a namespace treats failing calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Errors propagate unchanged; no negation table
    Plain,
    /// Failures abort the calling chain
    Affirming,
    /// Failures are recorded and the call returns null
    Soft,
}

impl From<&NamespacePolicy> for Policy {
    fn from(policy: &NamespacePolicy) -> Self {
        if policy.abort_on_failure {
            Policy::Affirming
        } else {
            Policy::Soft
        }
    }
}

/// A failure recorded by a soft namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub namespace: String,
    pub method: String,
    pub negated: bool,
    pub message: String,
}

/// Failures shared by every namespace of one composed API
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    entries: Arc<Mutex<Vec<Failure>>>,
}

impl FailureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, failure: Failure) {
        self.entries.lock().push(failure);
    }

    pub fn entries(&self) -> Vec<Failure> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// A named family of capabilities with nested child namespaces
pub struct Namespace {
    name: String,
    policy: Policy,
    affirm: IndexMap<String, Capability>,
    negate: IndexMap<String, Capability>,
    children: IndexMap<String, Namespace>,
    failures: FailureLog,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("methods", &self.affirm.keys().collect::<Vec<_>>())
            .field("children", &self.children)
            .finish()
    }
}

impl Namespace {
    pub fn new(name: impl Into<String>, policy: Policy, failures: FailureLog) -> Self {
        Self {
            name: name.into(),
            policy,
            affirm: IndexMap::new(),
            negate: IndexMap::new(),
            children: IndexMap::new(),
            failures,
        }
    }

    /// Root namespace of a composed API
    pub fn root(failures: FailureLog) -> Self {
        Self::new("", Policy::Plain, failures)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Install `capability` as `method`, replacing an existing entry
    pub fn install(&mut self, method: impl Into<String>, capability: Capability) {
        let method = method.into();

        if self.affirm.contains_key(&method) {
            debug!("{} shadows an earlier definition", self.qualified(&method));
        }

        match self.policy {
            Policy::Plain => {
                self.affirm.insert(method, capability);
            }
            Policy::Affirming | Policy::Soft => {
                self.affirm
                    .insert(method.clone(), with_negation(capability.clone(), false));
                self.negate.insert(method, with_negation(capability, true));
            }
        }
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.affirm.contains_key(method)
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.affirm.keys().map(String::as_str)
    }

    /// Call `method` with `args` through the namespace's failure policy
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.dispatch(&self.affirm, method, args, false)
    }

    /// Negation view
    pub fn not(&self) -> Negated<'_> {
        Negated { namespace: self }
    }

    pub fn child(&self, name: &str) -> Option<&Namespace> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = &Namespace> {
        self.children.values()
    }

    /// Child namespace `name`, created with `policy` when absent
    pub fn child_or_insert(&mut self, name: &str, policy: Policy) -> &mut Namespace {
        let failures = self.failures.clone();
        self.children
            .entry(name.to_string())
            .or_insert_with(|| Namespace::new(name, policy, failures))
    }

    /// Walk down `path`, creating missing segments with this namespace's policy
    pub fn ensure_path(&mut self, path: &[String]) -> &mut Namespace {
        match path.split_first() {
            None => self,
            Some((head, rest)) => {
                let policy = self.policy;
                self.child_or_insert(head, policy).ensure_path(rest)
            }
        }
    }

    /// Namespace at a dotted path such as `window.tabs`
    pub fn at(&self, path: &str) -> Option<&Namespace> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |ns, segment| ns.child(segment))
    }

    /// Method names and children as JSON, for listing
    pub fn describe(&self) -> Value {
        let children: serde_json::Map<String, Value> = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.describe()))
            .collect();
        json!({
            "policy": self.policy,
            "methods": self.methods().collect::<Vec<_>>(),
            "children": children,
        })
    }

    fn dispatch(
        &self,
        table: &IndexMap<String, Capability>,
        method: &str,
        args: Vec<Value>,
        negated: bool,
    ) -> Result<Value> {
        let capability = table.get(method).ok_or_else(|| Error::UnknownMethod {
            namespace: self.name.clone(),
            method: method.to_string(),
            negated,
        })?;

        match (capability.call(args), self.policy) {
            (Ok(value), _) => Ok(value),
            (Err(err), Policy::Plain) => Err(err),
            (Err(err), Policy::Affirming) => Err(Error::AssertionFailed {
                namespace: self.name.clone(),
                method: method.to_string(),
                message: err.to_string(),
            }),
            (Err(err), Policy::Soft) => {
                warn!("{} failed: {}", self.qualified(method), err);
                self.failures.record(Failure {
                    namespace: self.name.clone(),
                    method: method.to_string(),
                    negated,
                    message: err.to_string(),
                });
                Ok(Value::Null)
            }
        }
    }

    fn qualified(&self, method: &str) -> String {
        if self.name.is_empty() {
            method.to_string()
        } else {
            format!("{}.{}", self.name, method)
        }
    }
}

/// The `.not` view of a namespace
#[derive(Debug, Clone, Copy)]
pub struct Negated<'a> {
    namespace: &'a Namespace,
}

impl Negated<'_> {
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.namespace
            .dispatch(&self.namespace.negate, method, args, true)
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.namespace.negate.contains_key(method)
    }
}

/// Entry that hands the underlying capability one `{negate, args}` record
fn with_negation(capability: Capability, negate: bool) -> Capability {
    Arc::new(move |args: Vec<Value>| {
        let invocation = serde_json::to_value(Invocation { negate, args })?;
        capability.call(vec![invocation])
    })
}
