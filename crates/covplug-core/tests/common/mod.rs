//! Common test utilities: a small template plug-in module.
//!
//! Templates (`*.tmpl`) are compiled to `*.tmpl.py` next to them. The compiled
//! file is what executes; coverage is credited to the template.

#![allow(dead_code)]

use covplug_core::{
    ConfigAccess, CoveragePlugin, FileReporter, FileTracer, Frame, LineArc, LineNo, LineRange,
    OptionValue, PluginOptions, Registrar, ReporterChoice, files::ExecutableFiles,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Get the path to the test fixtures directory.
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

/// Route `tracing` output to the test harness; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Copy the template fixtures into a fresh directory and compile each one.
pub fn create_temp_project() -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("Failed to create temp dir");
    let templates = fixtures_dir().join("templates");
    for entry in std::fs::read_dir(&templates).expect("Failed to read fixtures") {
        let path = entry.expect("Failed to read fixture entry").path();
        let name = path.file_name().unwrap();
        std::fs::copy(&path, temp.path().join(name)).expect("Failed to copy fixture");
        if path.extension().is_some_and(|e| e == "tmpl") {
            let compiled = temp.path().join(format!("{}.py", name.to_string_lossy()));
            std::fs::write(compiled, "# compiled\n").expect("Failed to write compiled file");
        }
    }
    temp
}

/// `page.tmpl.py` -> `page.tmpl`
pub fn template_for(compiled: &Path) -> Option<PathBuf> {
    let name = compiled.file_name()?.to_str()?;
    let stem = name.strip_suffix(".tmpl.py")?;
    Some(compiled.with_file_name(format!("{stem}.tmpl")))
}

/// How compiled `page.tmpl.py` lines map onto `page.tmpl`
pub fn page_line_map() -> BTreeMap<LineNo, LineRange> {
    BTreeMap::from([
        (1, LineRange::UNMEASURED),
        (2, LineRange::single(2)),
        (3, LineRange::single(3)),
        (4, LineRange::single(4)),
        (5, LineRange::single(5)),
        (6, LineRange::UNMEASURED),
    ])
}

/// Tracer for one compiled template.
pub struct TemplateTracer {
    template: PathBuf,
    line_map: BTreeMap<LineNo, LineRange>,
}

impl FileTracer for TemplateTracer {
    fn source_filename(&self) -> PathBuf {
        self.template.clone()
    }

    fn line_number_range(&self, frame: &dyn Frame) -> eyre::Result<LineRange> {
        Ok(self
            .line_map
            .get(&frame.line())
            .copied()
            .unwrap_or(LineRange::UNMEASURED))
    }
}

/// Reporter for a template on disk.
///
/// Lines holding a `{{ }}` or `{% %}` tag are executable, and `{# nocover #}`
/// excludes a line. Loops are the only branches.
#[derive(Debug)]
pub struct TemplateReporter {
    path: PathBuf,
}

impl TemplateReporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn numbered_lines(&self) -> eyre::Result<Vec<(LineNo, String)>> {
        let source = self.source()?;
        Ok(source
            .lines()
            .enumerate()
            .map(|(i, text)| (i as LineNo + 1, text.to_string()))
            .collect())
    }
}

impl FileReporter for TemplateReporter {
    fn filename(&self) -> &Path {
        &self.path
    }

    fn lines(&self) -> eyre::Result<BTreeSet<LineNo>> {
        Ok(self
            .numbered_lines()?
            .into_iter()
            .filter(|(_, text)| text.contains("{{") || text.contains("{%"))
            .map(|(n, _)| n)
            .collect())
    }

    fn excluded_lines(&self) -> eyre::Result<BTreeSet<LineNo>> {
        Ok(self
            .numbered_lines()?
            .into_iter()
            .filter(|(_, text)| text.contains("{# nocover #}"))
            .map(|(n, _)| n)
            .collect())
    }

    fn arcs(&self) -> eyre::Result<BTreeSet<LineArc>> {
        let lines = self.numbered_lines()?;
        let mut arcs = BTreeSet::new();
        let mut loops = Vec::new();
        let mut prev = -1;
        for (n, text) in &lines {
            let n = *n;
            if !(text.contains("{{") || text.contains("{%")) || text.contains("{# nocover #}") {
                continue;
            }
            arcs.insert((prev, n));
            if text.contains("{% for") {
                loops.push(n);
            }
            if text.contains("{% endfor") {
                if let Some(head) = loops.pop() {
                    arcs.insert((n, head));
                    prev = head;
                    continue;
                }
            }
            prev = n;
        }
        arcs.insert((prev, -1));
        Ok(arcs)
    }

    fn missing_arc_description(
        &self,
        start: LineNo,
        end: LineNo,
        _executed_arcs: Option<&BTreeSet<LineArc>>,
    ) -> String {
        if end < 0 {
            format!("line {start} didn't finish the template")
        } else {
            format!("line {start} didn't continue to line {end}")
        }
    }
}

/// File tracer for compiled templates with a fixed line map.
pub struct Templates {
    line_map: BTreeMap<LineNo, LineRange>,
}

impl Templates {
    pub fn new(line_map: BTreeMap<LineNo, LineRange>) -> Rc<Self> {
        Rc::new(Self { line_map })
    }
}

impl CoveragePlugin for Templates {
    fn file_tracer(&self, filename: &Path) -> eyre::Result<Option<Box<dyn FileTracer>>> {
        Ok(template_for(filename).map(|template| {
            Box::new(TemplateTracer {
                template,
                line_map: self.line_map.clone(),
            }) as Box<dyn FileTracer>
        }))
    }

    fn file_reporter(&self, filename: &Path) -> eyre::Result<Option<ReporterChoice>> {
        Ok(Some(ReporterChoice::Plugin(Box::new(TemplateReporter::new(
            filename,
        )))))
    }

    fn find_executable_files(&self, src_dir: &Path) -> eyre::Result<Vec<PathBuf>> {
        ExecutableFiles::new(src_dir).include(["**/*.tmpl"]).find()
    }

    fn sys_info(&self) -> Vec<(String, String)> {
        vec![("mapped_lines".to_string(), self.line_map.len().to_string())]
    }
}

/// Tracer for one compiled file that renders several templates.
///
/// `render_<name>` functions execute `<name>.tmpl`; other frames are glue.
pub struct BundleTracer {
    dir: PathBuf,
}

impl FileTracer for BundleTracer {
    fn source_filename(&self) -> PathBuf {
        self.dir.join("bundle.tmpl")
    }

    fn has_dynamic_source_filename(&self) -> bool {
        true
    }

    fn dynamic_source_filename(
        &self,
        _filename: &Path,
        frame: &dyn Frame,
    ) -> eyre::Result<Option<PathBuf>> {
        Ok(frame
            .function()
            .strip_prefix("render_")
            .map(|name| self.dir.join(format!("{name}.tmpl"))))
    }
}

/// File tracer for `bundle.py`, a compiled template bundle.
pub struct Bundles;

impl CoveragePlugin for Bundles {
    fn file_tracer(&self, filename: &Path) -> eyre::Result<Option<Box<dyn FileTracer>>> {
        if filename.file_name().is_some_and(|n| n == "bundle.py") {
            let dir = filename.parent().unwrap_or(Path::new("/")).to_path_buf();
            return Ok(Some(Box::new(BundleTracer { dir })));
        }
        Ok(None)
    }

    fn file_reporter(&self, filename: &Path) -> eyre::Result<Option<ReporterChoice>> {
        Ok(Some(ReporterChoice::Plugin(Box::new(TemplateReporter::new(
            filename,
        )))))
    }
}

/// Starts a `test:<name>` context at each `test_*` function.
pub struct TestContexts;

impl CoveragePlugin for TestContexts {
    fn dynamic_context(&self, frame: &dyn Frame) -> eyre::Result<Option<String>> {
        Ok(frame
            .function()
            .starts_with("test_")
            .then(|| format!("test:{}", frame.function())))
    }
}

/// Turns on branch coverage and tightens the report precision.
pub struct StrictConfig {
    precision: i64,
}

impl CoveragePlugin for StrictConfig {
    fn configure(&self, config: &mut dyn ConfigAccess) -> eyre::Result<()> {
        config.set_option("run:branch", OptionValue::Bool(true))?;
        config.set_option("report:precision", OptionValue::Int(self.precision))?;
        Ok(())
    }
}

/// Init function of the `templates` module.
///
/// Option `precision` (default 2) is passed to the configurer.
pub fn coverage_init(reg: &mut Registrar<'_>, options: &PluginOptions) -> eyre::Result<()> {
    let precision = match options.get("precision") {
        Some(value) => value.parse()?,
        None => 2,
    };
    reg.add_file_tracer(Templates::new(page_line_map()));
    reg.add_configurer(Rc::new(StrictConfig { precision }));
    reg.add_dynamic_context(Rc::new(TestContexts));
    Ok(())
}
