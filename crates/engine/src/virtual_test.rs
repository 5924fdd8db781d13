//! Virtual test synthesis
//!
//! Turns a non-test source file into a generated test suite: one case per
//! selected export, each built by a caller-supplied test-body factory. The
//! generated text is appended to the file's bundle, compiled again and run in
//! a sandbox, so its only observable effect is the test cases it registers.

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use quiver_common::{Error, Result};

use crate::bundler::{Bundler, TransformOptions};
use crate::exports::discover_exports;
use crate::host::{ScriptHost, TestRegistrar};
use crate::module::{Callable, Export, DEFAULT_EXPORT};
use crate::sandbox::Sandbox;

type TitleFn = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Picks the exports to generate cases for, given all discovered names and
/// the file path
pub type ExportSelector =
    Arc<dyn Fn(Vec<String>, PathBuf) -> BoxFuture<'static, Result<Vec<String>>> + Send + Sync>;

/// Title template of a generated case
#[derive(Clone)]
pub enum CaseTitle {
    Literal(String),
    /// Computed from the export name
    Computed(Arc<TitleFn>),
}

impl CaseTitle {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        CaseTitle::Computed(Arc::new(f))
    }

    pub fn for_export(&self, export_name: &str) -> Result<String> {
        match self {
            CaseTitle::Literal(title) => Ok(title.clone()),
            CaseTitle::Computed(f) => f(export_name),
        }
    }
}

impl fmt::Debug for CaseTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaseTitle::Literal(title) => f.debug_tuple("Literal").field(title).finish(),
            CaseTitle::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// How to build a virtual suite for a matching file
#[derive(Clone)]
pub struct VirtualTestSpec {
    pub name: CaseTitle,
    /// Files the declaration applies to; all files when absent
    pub filter: Option<Regex>,
    pub exports: Option<ExportSelector>,
    /// Source text of the test-body factory; it is inlined into the
    /// generated suite
    pub create_test: String,
}

impl fmt::Debug for VirtualTestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualTestSpec")
            .field("name", &self.name)
            .field("filter", &self.filter.as_ref().map(Regex::as_str))
            .field("exports", &self.exports.as_ref().map(|_| ".."))
            .field("create_test", &self.create_test)
            .finish()
    }
}

impl VirtualTestSpec {
    pub fn new(name: CaseTitle, create_test: impl Into<String>) -> Self {
        Self {
            name,
            filter: None,
            exports: None,
            create_test: create_test.into(),
        }
    }

    pub fn with_filter(mut self, filter: Regex) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_exports<F>(mut self, selector: F) -> Self
    where
        F: Fn(Vec<String>, PathBuf) -> BoxFuture<'static, Result<Vec<String>>>
            + Send
            + Sync
            + 'static,
    {
        self.exports = Some(Arc::new(selector));
        self
    }

    /// Whether this declaration applies to `path`
    pub fn matches(&self, path: &Path) -> bool {
        self.filter
            .as_ref()
            .map_or(true, |filter| filter.is_match(&path.to_string_lossy()))
    }

    /// Build a spec from a declaration exported by a plugin or the virtuals
    /// file. Function members are called through the host that loaded them.
    pub fn from_export(declaration: &Export, origin: &Path) -> Result<Self> {
        let invalid = |message: &str| Error::invalid_export(origin, message);

        if !matches!(declaration, Export::Object(_)) {
            return Err(invalid("virtual test declaration must be an object"));
        }

        let name = match declaration.get("name") {
            Some(Export::Value(Value::String(title))) => CaseTitle::Literal(title.clone()),
            Some(Export::Function(f)) => {
                let f = f.clone();
                CaseTitle::computed(move |export_name| match f.call(vec![json!(export_name)])? {
                    Value::String(title) => Ok(title),
                    other => Ok(other.to_string()),
                })
            }
            _ => return Err(invalid("virtual test `name` must be a string or function")),
        };

        let filter = match declaration.get("filter") {
            None => None,
            Some(export) if export.is_null() => None,
            Some(Export::Pattern(source)) | Some(Export::Value(Value::String(source))) => {
                Some(Regex::new(source).map_err(|e| {
                    invalid(&format!("virtual test `filter` is not a pattern: {}", e))
                })?)
            }
            Some(_) => return Err(invalid("virtual test `filter` must be a pattern")),
        };

        let exports = match declaration.get("exports") {
            None => None,
            Some(export) if export.is_null() => None,
            Some(Export::Function(f)) => Some(bridge_selector(f.clone())),
            Some(_) => return Err(invalid("virtual test `exports` must be a function")),
        };

        let create_test = match declaration.get("createTest") {
            Some(Export::Function(f)) => f
                .source()
                .map(String::from)
                .ok_or_else(|| invalid("virtual test `createTest` has no source text"))?,
            Some(Export::Value(Value::String(source))) => source.clone(),
            _ => return Err(invalid("virtual test `createTest` must be a function")),
        };

        Ok(Self {
            name,
            filter,
            exports,
            create_test,
        })
    }
}

/// Run a bridged selector on a worker thread so awaiting it never blocks the
/// caller's executor
fn bridge_selector(f: Arc<dyn Callable>) -> ExportSelector {
    Arc::new(move |names: Vec<String>, path: PathBuf| {
        let f = f.clone();
        let (tx, rx) = oneshot::channel();
        std::thread::spawn(move || {
            let _ = tx.send(f.call(vec![json!(names), json!(path)]));
        });
        async move {
            let selected = rx.await.map_err(|_| {
                Error::Internal("export selector exited without a result".into())
            })??;
            Ok::<_, Error>(Export::Value(selected).string_list())
        }
        .boxed()
    })
}

/// One generated test case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualCase {
    pub export_name: String,
    pub title: String,
}

/// Generated suite, ready to execute
#[derive(Debug, Clone, Serialize)]
pub struct SynthesizedSuite {
    pub suite_title: String,
    /// Identity the generated code is attributed to
    pub virtual_path: PathBuf,
    pub cases: Vec<VirtualCase>,
    pub script: String,
}

/// Builds and runs virtual suites
#[derive(Clone)]
pub struct VirtualTestSynthesizer {
    bundler: Arc<dyn Bundler>,
    host: Arc<dyn ScriptHost>,
    registrar: Arc<dyn TestRegistrar>,
    cwd: PathBuf,
}

impl VirtualTestSynthesizer {
    pub fn new(
        bundler: Arc<dyn Bundler>,
        host: Arc<dyn ScriptHost>,
        registrar: Arc<dyn TestRegistrar>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bundler,
            host,
            registrar,
            cwd: cwd.into(),
        }
    }

    pub async fn synthesize(
        &self,
        file: &Path,
        spec: &VirtualTestSpec,
    ) -> Result<SynthesizedSuite> {
        let compiled = self.bundler.build(file).await?;

        let discovered = discover_exports(file).await?;
        let export_names = match &spec.exports {
            Some(select) => select(discovered.to_vec(), file.to_path_buf()).await?,
            None => discovered
                .iter()
                .filter(|name| *name != DEFAULT_EXPORT)
                .map(String::from)
                .collect(),
        };

        let cases = export_names
            .into_iter()
            .map(|export_name| {
                let title = spec.name.for_export(&export_name)?;
                Ok(VirtualCase { export_name, title })
            })
            .collect::<Result<Vec<_>>>()?;

        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suite_title = format!("Virtual test for the {} component", file_name);
        let virtual_path = virtual_path_for(file);

        let source = render_suite(
            &compiled.text,
            &suite_title,
            &cases,
            &spec.create_test,
            file,
            &public_url(file, &self.cwd),
        );

        let options = TransformOptions::for_module(file, &virtual_path);
        let script = self.bundler.transform(&source, &options).await?;

        debug!("Synthesized {} case(s) for {}", cases.len(), file.display());

        Ok(SynthesizedSuite {
            suite_title,
            virtual_path,
            cases,
            script,
        })
    }

    /// Synthesize and execute; the cases register with the registrar
    pub async fn run(&self, file: &Path, spec: &VirtualTestSpec) -> Result<SynthesizedSuite> {
        let suite = self.synthesize(file, spec).await?;

        Sandbox::new(self.host.clone(), self.registrar.clone(), file, &self.cwd)
            .with_virtual_path(&suite.virtual_path)
            .execute(&suite.script)?;

        info!(
            "Registered virtual suite for {} ({} case(s))",
            file.display(),
            suite.cases.len()
        );
        Ok(suite)
    }
}

/// `<dir>/<stem>.js`
pub fn virtual_path_for(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    file.with_file_name(format!("{}.js", stem))
}

/// The file path with the working directory stripped, `/`-separated
pub fn public_url(file: &Path, cwd: &Path) -> String {
    let relative = file.strip_prefix(cwd).unwrap_or(file);
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Identifier the bundler gives a file's default export
pub fn default_export_identifier(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut ident: String = stem
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '$' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if ident.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    format!("{}_{}", ident, DEFAULT_EXPORT)
}

fn render_suite(
    bundle: &str,
    suite_title: &str,
    cases: &[VirtualCase],
    create_test: &str,
    file: &Path,
    public_url: &str,
) -> String {
    let module_path = json!(file.to_string_lossy()).to_string();
    let public_url = json!(public_url).to_string();

    let body: Vec<String> = cases
        .iter()
        .map(|case| {
            let target = if case.export_name == DEFAULT_EXPORT {
                default_export_identifier(file)
            } else {
                case.export_name.clone()
            };
            format!(
                r#"  it({title}, async function (browser) {{
    const test = await Promise.resolve(({create_test})({{
      modulePath: {module_path},
      exportName: {export_name},
      publicUrl: {public_url}
    }}));

    const data = (await Promise.resolve(test(browser))) ?? {{}};

    await Promise.resolve({target}.test?.(browser, data));
  }});"#,
                title = json!(case.title),
                create_test = create_test,
                module_path = module_path,
                export_name = json!(case.export_name),
                public_url = public_url,
                target = target,
            )
        })
        .collect();

    format!(
        "{bundle}\n\ndescribe({suite}, function () {{\n{body}\n}});\n",
        bundle = bundle,
        suite = json!(suite_title),
        body = body.join("\n\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::CompiledScript;
    use crate::host::{CollectingRegistrar, EvalOutcome, MemoryHost};
    use async_trait::async_trait;
    use futures::future;
    use std::fs;

    struct PassthroughBundler;

    #[async_trait]
    impl Bundler for PassthroughBundler {
        async fn build(&self, entry: &Path) -> Result<CompiledScript> {
            Ok(CompiledScript {
                text: "/* bundle */".into(),
                source: entry.to_path_buf(),
            })
        }

        async fn transform(&self, code: &str, _options: &TransformOptions) -> Result<String> {
            Ok(code.to_string())
        }
    }

    fn synthesizer(host: MemoryHost, cwd: &Path) -> VirtualTestSynthesizer {
        VirtualTestSynthesizer::new(
            Arc::new(PassthroughBundler),
            Arc::new(host),
            Arc::new(CollectingRegistrar::new()),
            cwd,
        )
    }

    fn component(dir: &Path) -> PathBuf {
        let file = dir.join("src").join("button.tsx");
        fs::create_dir_all(file.parent().unwrap()).unwrap();
        fs::write(
            &file,
            "export default function Button() {}\nexport const foo = 1;\nexport const bar = 2;\n",
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_selector_yields_one_case_per_selected_export() {
        let dir = tempfile::tempdir().unwrap();
        let file = component(dir.path());

        let spec = VirtualTestSpec::new(
            CaseTitle::computed(|name| Ok(name.to_string())),
            "({ exportName }) => (browser) => {}",
        )
        .with_exports(|names, _path| {
            let kept: Vec<String> = names.into_iter().filter(|n| n != "default").collect();
            future::ready(Ok(kept)).boxed()
        });

        let suite = synthesizer(MemoryHost::new(), dir.path())
            .synthesize(&file, &spec)
            .await
            .unwrap();

        let titles: Vec<_> = suite.cases.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["foo", "bar"]);
        assert_eq!(suite.script.matches("  it(").count(), 2);
        assert!(suite.script.contains("exportName: \"foo\""));
        assert!(suite.script.contains("exportName: \"bar\""));
        assert!(!suite.script.contains("exportName: \"default\""));
        assert!(suite.script.contains("publicUrl: \"/src/button.tsx\""));
        assert_eq!(
            suite.suite_title,
            "Virtual test for the button.tsx component"
        );
    }

    #[tokio::test]
    async fn test_without_selector_default_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = component(dir.path());
        let spec = VirtualTestSpec::new(CaseTitle::Literal("renders".into()), "() => () => {}");

        let suite = synthesizer(MemoryHost::new(), dir.path())
            .synthesize(&file, &spec)
            .await
            .unwrap();

        let exports: Vec<_> = suite.cases.iter().map(|c| c.export_name.as_str()).collect();
        assert_eq!(exports, vec!["foo", "bar"]);
        assert!(suite.cases.iter().all(|c| c.title == "renders"));
    }

    #[tokio::test]
    async fn test_default_export_is_referenced_by_bundled_name() {
        let dir = tempfile::tempdir().unwrap();
        let file = component(dir.path());
        let spec = VirtualTestSpec::new(CaseTitle::Literal("t".into()), "() => () => {}")
            .with_exports(|_, _| {
                future::ready(Ok(vec!["default".to_string()])).boxed()
            });

        let suite = synthesizer(MemoryHost::new(), dir.path())
            .synthesize(&file, &spec)
            .await
            .unwrap();

        assert!(suite.script.contains("button_default.test?.("));
    }

    #[tokio::test]
    async fn test_run_executes_under_virtual_identity() {
        let dir = tempfile::tempdir().unwrap();
        let file = component(dir.path());
        let host = MemoryHost::new().with_evaluator(|_| Ok(EvalOutcome::default()));
        let spec = VirtualTestSpec::new(CaseTitle::Literal("t".into()), "() => () => {}");

        let suite = synthesizer(host.clone(), dir.path())
            .run(&file, &spec)
            .await
            .unwrap();

        let unit = &host.evaluated()[0];
        assert_eq!(unit.real_path, file);
        assert_eq!(unit.virtual_path, dir.path().join("src").join("button.js"));
        assert_eq!(suite.virtual_path, unit.virtual_path);
    }

    #[test]
    fn test_public_url_and_identifiers() {
        assert_eq!(
            public_url(Path::new("/work/src/ui/button.tsx"), Path::new("/work")),
            "/src/ui/button.tsx"
        );
        assert_eq!(
            default_export_identifier(Path::new("/src/my-button.tsx")),
            "my_button_default"
        );
        assert_eq!(
            virtual_path_for(Path::new("/src/button.tsx")),
            PathBuf::from("/src/button.js")
        );
    }

    #[test]
    fn test_from_export_declaration() {
        let title = Export::function(|args| {
            let export_name = args[0].as_str().unwrap_or("");
            Ok(json!(format!("renders {}", export_name)))
        });
        let declaration = Export::object([
            ("name", title),
            ("filter", Export::Pattern(r"\.tsx$".into())),
            ("createTest", Export::Value(json!("() => () => {}"))),
        ]);

        let spec =
            VirtualTestSpec::from_export(&declaration, Path::new("/work/plugin.js")).unwrap();
        assert_eq!(spec.name.for_export("Primary").unwrap(), "renders Primary");
        assert!(spec.matches(Path::new("/work/src/button.tsx")));
        assert!(!spec.matches(Path::new("/work/src/util.ts")));
        assert!(spec.exports.is_none());
    }

    #[test]
    fn test_from_export_requires_create_test() {
        let declaration = Export::object([("name", Export::Value(json!("t")))]);
        let err = VirtualTestSpec::from_export(&declaration, Path::new("/p.js")).unwrap_err();
        assert!(matches!(err, Error::InvalidExport { .. }));
    }

    #[tokio::test]
    async fn test_bridged_selector() {
        let declaration = Export::object([
            ("name", Export::Value(json!("t"))),
            ("createTest", Export::Value(json!("() => () => {}"))),
            (
                "exports",
                Export::function(|args| {
                    let names = args[0].as_array().cloned().unwrap_or_default();
                    Ok(Value::Array(names.into_iter().rev().collect()))
                }),
            ),
        ]);

        let spec = VirtualTestSpec::from_export(&declaration, Path::new("/p.js")).unwrap();
        let select = spec.exports.unwrap();
        let picked = select(vec!["a".into(), "b".into()], PathBuf::from("/f.ts"))
            .await
            .unwrap();
        assert_eq!(picked, vec!["b", "a"]);
    }
}
