//! Node.js host driven through generated driver scripts
//!
//! Every host operation writes a small CommonJS driver to a temporary
//! directory and runs it with `node`. Values cross the process boundary as a
//! tagged JSON description printed after [`RESULT_MARKER`]; failures are
//! reported as a `{code, message}` JSON line on stderr.

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, trace};

use quiver_common::{Error, Result, Settings};

use super::{EvalOutcome, EvalUnit, ScriptHost, TestRegistration};
use crate::module::{Callable, Convention, Export};

/// Marks the line carrying the driver's JSON result on stdout
const RESULT_MARKER: &str = "@@quiver-result@@";

/// Error code Node uses when `require` meets an ES module
const REQUIRE_ESM_CODE: &str = "ERR_REQUIRE_ESM";

/// Shared helpers prepended to every driver
const PRELUDE: &str = r#"
const __quiverMarker = '@@quiver-result@@';

const __quiverDescribe = (value, seen = new WeakSet(), depth = 0) => {
  if (typeof value === 'function') {
    return { kind: 'function', source: Function.prototype.toString.call(value) };
  }
  if (value instanceof RegExp) {
    return { kind: 'pattern', source: value.source };
  }
  if (value === null || typeof value !== 'object') {
    const plain = typeof value === 'symbol' || typeof value === 'bigint' ? String(value) : value;
    return { kind: 'value', value: plain === undefined ? null : plain };
  }
  if (seen.has(value) || depth > 16) {
    return { kind: 'value', value: null };
  }
  seen.add(value);
  if (Array.isArray(value)) {
    return { kind: 'list', items: value.map((item) => __quiverDescribe(item, seen, depth + 1)) };
  }
  const entries = {};
  for (const key of Object.keys(value)) {
    entries[key] = __quiverDescribe(value[key], seen, depth + 1);
  }
  return { kind: 'object', entries };
};

// Exit once the result is flushed; handles the loaded code left open
// (timers, sockets) must not keep the driver alive.
const __quiverEmit = (payload) => {
  process.stdout.write('\n' + __quiverMarker + JSON.stringify(payload) + '\n', () => process.exit(0));
};

const __quiverFail = (err) => {
  const report = {
    code: (err && err.code) || null,
    message: String((err && err.message) || err),
  };
  process.stderr.write('\n' + JSON.stringify(report) + '\n', () => process.exit(1));
};

const __quiverLoad = (target, mode) => {
  if (mode === 'import') {
    const { pathToFileURL } = require('url');
    return import(pathToFileURL(target).href);
  }
  return Promise.resolve().then(() => require(target));
};
"#;

/// Tagged value description produced by `__quiverDescribe`
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Described {
    Value {
        #[serde(default)]
        value: Value,
    },
    Function {
        source: String,
    },
    Object {
        entries: IndexMap<String, Described>,
    },
    List {
        items: Vec<Described>,
    },
    Pattern {
        source: String,
    },
}

#[derive(Debug, Deserialize)]
struct SandboxReport {
    exports: Described,
    #[serde(default)]
    registrations: Vec<TestRegistration>,
}

/// Failure reported by the script itself
#[derive(Debug, Deserialize)]
struct ScriptFailure {
    code: Option<String>,
    message: String,
}

/// Where a bridged function lives
#[derive(Debug, Clone)]
enum FunctionOrigin {
    Module {
        path: PathBuf,
        convention: Convention,
    },
    /// Produced by an evaluated script; its process is gone
    Evaluated { identity: PathBuf },
}

/// Host backed by a `node` binary
#[derive(Debug, Clone)]
pub struct NodeHost {
    node: PathBuf,
    cwd: PathBuf,
}

impl NodeHost {
    pub fn new(node: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            node: node.into(),
            cwd: cwd.into(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.runtime.node.clone(), settings.cwd())
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Check that the runtime binary can be started
    pub fn check_installed(&self) -> Result<String> {
        let output = Command::new(&self.node)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.unavailable(e))?;

        if !output.status.success() {
            return Err(Error::HostUnavailable(format!(
                "{} --version exited with {}",
                self.node.display(),
                output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn unavailable(&self, e: std::io::Error) -> Error {
        Error::HostUnavailable(format!("{}: {}", self.node.display(), e))
    }

    fn load(&self, path: &Path, convention: Convention) -> Result<Export> {
        let mode = match convention {
            Convention::Require => "require",
            Convention::Import => "import",
        };
        let script = format!(
            "{prelude}\n__quiverLoad({target}, {mode})\n  .then((value) => __quiverEmit(__quiverDescribe(value)))\n  .catch(__quiverFail);\n",
            prelude = PRELUDE,
            target = json!(path),
            mode = json!(mode),
        );

        debug!("Loading {} via {}", path.display(), mode);

        match self.run_driver(&script)? {
            Ok(payload) => {
                let described: Described = serde_json::from_str(&payload)?;
                let origin = FunctionOrigin::Module {
                    path: path.to_path_buf(),
                    convention,
                };
                Ok(self.to_export(described, &origin, &mut Vec::new()))
            }
            Err(failure) if failure.code.as_deref() == Some(REQUIRE_ESM_CODE) => {
                Err(Error::RequireEsm {
                    path: path.display().to_string(),
                })
            }
            Err(failure) => Err(Error::module(path, failure.message)),
        }
    }

    fn invoke(&self, origin: &FunctionOrigin, trail: &[String], args: Vec<Value>) -> Result<Value> {
        let name = trail.join(".");
        let (path, convention) = match origin {
            FunctionOrigin::Module { path, convention } => (path, *convention),
            FunctionOrigin::Evaluated { identity } => {
                return Err(Error::Invocation {
                    name,
                    message: format!(
                        "function exported by evaluated script {} is not callable after the run",
                        identity.display()
                    ),
                });
            }
        };
        let mode = match convention {
            Convention::Import => "import",
            Convention::Require => "require",
        };

        let script = format!(
            r#"{prelude}
const __trail = {trail};
const __args = {args};
__quiverLoad({target}, {mode})
  .then(async (root) => {{
    let owner;
    let fn = root;
    for (const key of __trail) {{
      owner = fn;
      fn = fn == null ? undefined : fn[key];
    }}
    if (typeof fn !== 'function') {{
      throw new TypeError(__trail.join('.') + ' is not a function');
    }}
    let result;
    if (/^class[\s{{]/.test(Function.prototype.toString.call(fn))) {{
      const instance = new fn();
      if (typeof instance.command !== 'function') {{
        throw new TypeError(__trail.join('.') + ' is a class without a command() method');
      }}
      result = await instance.command(...__args);
    }} else {{
      result = await fn.apply(owner, __args);
    }}
    __quiverEmit(__quiverDescribe(result));
  }})
  .catch(__quiverFail);
"#,
            prelude = PRELUDE,
            trail = json!(trail),
            args = Value::Array(args),
            target = json!(path),
            mode = json!(mode),
        );

        trace!("Invoking {} from {}", name, path.display());

        match self.run_driver(&script)? {
            Ok(payload) => {
                let described: Described = serde_json::from_str(&payload)?;
                let export = self.to_export(described, origin, &mut Vec::new());
                Ok(export.to_value())
            }
            Err(failure) => Err(Error::Invocation {
                name,
                message: failure.message,
            }),
        }
    }

    fn sandbox_script(&self, unit: &EvalUnit) -> Result<String> {
        Ok(format!(
            r#"{prelude}
const path = require('path');
const {{ Script }} = require('vm');
const {{ builtinModules }} = require('module');

const __unit = {unit};
const __registrations = [];
const __suites = [];

globalThis.describe = function (title, body) {{
  __suites.push(String(title));
  try {{
    if (typeof body === 'function') body.call({{}});
  }} finally {{
    __suites.pop();
  }}
}};
globalThis.it = globalThis.test = function (title) {{
  __registrations.push({{
    suite: __suites.length ? __suites[__suites.length - 1] : null,
    title: String(title),
    origin: __unit.virtual_path,
  }});
}};

const __builtins = new Set(builtinModules);
const __sandboxRequire = function (request) {{
  const bare = request.startsWith('node:') ? request.slice(5) : request;
  if (request.startsWith('node:') || __builtins.has(bare)) {{
    return require(bare);
  }}
  const relativePoint = request.startsWith('.') ? __unit.scope.base_dir : __unit.scope.package_root;
  const absolute = path.isAbsolute(request) ? request : path.join(relativePoint, request);
  return require(absolute);
}};

const __module = {{ exports: {{}} }};
let __report;
try {{
  new Script(__unit.wrapped, {{ filename: __unit.virtual_path }})
    .runInThisContext()(__module, __sandboxRequire, __unit.real_path, path.dirname(__unit.real_path));
  __report = {{ exports: __quiverDescribe(__module.exports), registrations: __registrations }};
}} catch (err) {{
  __quiverFail(err);
}}
if (__report) __quiverEmit(__report);
"#,
            prelude = PRELUDE,
            unit = serde_json::to_string(unit)?,
        ))
    }

    /// Run a driver script; the outer result covers spawning and protocol
    /// errors, the inner one failures the script reported.
    fn run_driver(&self, script: &str) -> Result<std::result::Result<String, ScriptFailure>> {
        let temp_dir = tempfile::tempdir()?;
        let driver_path = temp_dir.path().join("driver.cjs");
        std::fs::write(&driver_path, script)?;

        let output = Command::new(&self.node)
            .arg(&driver_path)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.unavailable(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let failure = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .and_then(|line| serde_json::from_str::<ScriptFailure>(line).ok())
                .unwrap_or_else(|| ScriptFailure {
                    code: None,
                    message: stderr.trim().to_string(),
                });
            return Ok(Err(failure));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix(RESULT_MARKER))
            .map(|payload| Ok(payload.to_string()))
            .ok_or_else(|| Error::Internal("host driver produced no result".into()))
    }

    fn to_export(
        &self,
        described: Described,
        origin: &FunctionOrigin,
        trail: &mut Vec<String>,
    ) -> Export {
        match described {
            Described::Value { value } => Export::Value(value),
            Described::Pattern { source } => Export::Pattern(source),
            Described::Function { source } => Export::Function(Arc::new(NodeFunction {
                host: self.clone(),
                origin: origin.clone(),
                trail: trail.clone(),
                source,
            })),
            Described::Object { entries } => Export::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| {
                        trail.push(key.clone());
                        let export = self.to_export(value, origin, trail);
                        trail.pop();
                        (key, export)
                    })
                    .collect(),
            ),
            Described::List { items } => Export::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| {
                        trail.push(index.to_string());
                        let export = self.to_export(value, origin, trail);
                        trail.pop();
                        export
                    })
                    .collect(),
            ),
        }
    }
}

impl ScriptHost for NodeHost {
    fn require(&self, path: &Path) -> Result<Export> {
        self.load(path, Convention::Require)
    }

    fn import(&self, path: &Path) -> BoxFuture<'static, Result<Export>> {
        let host = self.clone();
        let path = path.to_path_buf();
        let (tx, rx) = futures::channel::oneshot::channel();

        std::thread::spawn(move || {
            let _ = tx.send(host.load(&path, Convention::Import));
        });

        async move {
            rx.await.map_err(|_| {
                Error::Internal("import worker exited without a result".to_string())
            })?
        }
        .boxed()
    }

    fn evaluate(&self, unit: &EvalUnit) -> Result<EvalOutcome> {
        let script = self.sandbox_script(unit)?;
        debug!(
            "Evaluating {} as {}",
            unit.real_path.display(),
            unit.virtual_path.display()
        );

        match self.run_driver(&script)? {
            Ok(payload) => {
                let report: SandboxReport = serde_json::from_str(&payload)?;
                let origin = FunctionOrigin::Evaluated {
                    identity: unit.virtual_path.clone(),
                };
                Ok(EvalOutcome {
                    exports: self.to_export(report.exports, &origin, &mut Vec::new()),
                    registrations: report.registrations,
                })
            }
            Err(failure) => Err(Error::module(&unit.virtual_path, failure.message)),
        }
    }
}

/// Function exported by a module loaded in the Node host
struct NodeFunction {
    host: NodeHost,
    origin: FunctionOrigin,
    /// Keys leading from the loaded value to the function
    trail: Vec<String>,
    source: String,
}

impl Callable for NodeFunction {
    fn call(&self, args: Vec<Value>) -> Result<Value> {
        self.host.invoke(&self.origin, &self.trail, args)
    }

    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }
}
