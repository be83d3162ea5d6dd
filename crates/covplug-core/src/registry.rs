//! Plug-in registration and arbitration

use crate::config::Config;
use crate::error::PluginError;
use crate::files::canonical_filename;
use crate::plugin::{CoveragePlugin, PluginInit};
use crate::reporter::ReporterChoice;
use crate::tracer::{FileTracer, Frame, LineRange};
use eyre::{Result, WrapErr};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};

/// Wrap a hook's failure with the plug-in and method it came from.
pub(crate) fn hook<T>(plugin: &str, method: &'static str, result: Result<T>) -> Result<T> {
    result.map_err(|source| {
        PluginError::Hook {
            plugin: plugin.to_string(),
            method,
            source,
        }
        .into()
    })
}

/// Last path segment of a type name, without generic arguments.
fn short_type_name<P: ?Sized>() -> &'static str {
    let full = std::any::type_name::<P>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

struct Entry {
    name: String,
    plugin: Rc<dyn CoveragePlugin>,
}

/// All loaded plug-ins, by capability.
///
/// Built once at start-up and append-only afterwards. Each capability list
/// keeps registration order, which is the order claims are offered in.
#[derive(Default)]
pub struct Plugins {
    entries: Vec<Entry>,
    file_tracers: Vec<usize>,
    configurers: Vec<usize>,
    context_switchers: Vec<usize>,
}

impl Plugins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every module's init function, then every configurer.
    ///
    /// Each init receives the options stored for its module name in
    /// `config`. Configurers run once each, in registration order, after all
    /// modules are loaded.
    pub fn load(modules: &[(&str, PluginInit)], config: &mut Config) -> Result<Self> {
        let mut plugins = Self::new();
        for &(module, init) in modules {
            let options = config.plugin_options(module);
            let mut registrar = Registrar::new(&mut plugins, module);
            init(&mut registrar, &options)
                .wrap_err_with(|| format!("Plugin module {module:?} failed to initialize"))?;
            if registrar.added == 0 {
                return Err(PluginError::NoPluginsDefined {
                    module: module.to_string(),
                }
                .into());
            }
            debug!(module, options = options.len(), "loaded plugin module");
        }
        plugins.configure(config)?;
        Ok(plugins)
    }

    /// Give every configurer its one chance to adjust `config`.
    pub fn configure(&self, config: &mut Config) -> Result<()> {
        for entry in self.configurers() {
            debug!(plugin = %entry.name, "configure");
            hook(&entry.name, "configure", entry.plugin.configure(config))?;
        }
        Ok(())
    }

    /// Add `plugin` under `name`, or find it if this instance is already in.
    ///
    /// A distinct instance whose name is taken gets `#2`, `#3`, ... appended,
    /// so every display name identifies exactly one plug-in.
    fn push(&mut self, name: String, plugin: Rc<dyn CoveragePlugin>) -> usize {
        if let Some(idx) = self
            .entries
            .iter()
            .position(|e| std::ptr::addr_eq(Rc::as_ptr(&e.plugin), Rc::as_ptr(&plugin)))
        {
            return idx;
        }
        let mut unique = name.clone();
        let mut n = 1;
        while self.entries.iter().any(|e| e.name == unique) {
            n += 1;
            unique = format!("{name}#{n}");
        }
        self.entries.push(Entry {
            name: unique,
            plugin,
        });
        self.entries.len() - 1
    }

    fn configurers(&self) -> impl Iterator<Item = &Entry> {
        self.configurers.iter().map(|&i| &self.entries[i])
    }

    fn file_tracer_entries(&self) -> impl Iterator<Item = &Entry> {
        self.file_tracers.iter().map(|&i| &self.entries[i])
    }

    fn context_switchers(&self) -> impl Iterator<Item = &Entry> {
        self.context_switchers.iter().map(|&i| &self.entries[i])
    }

    /// Number of distinct plug-ins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display names of all plug-ins, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Look a plug-in up by display name
    pub fn get(&self, name: &str) -> Option<&Rc<dyn CoveragePlugin>> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.plugin)
    }

    pub fn has_file_tracers(&self) -> bool {
        !self.file_tracers.is_empty()
    }

    pub fn has_dynamic_contexts(&self) -> bool {
        !self.context_switchers.is_empty()
    }

    /// Offer `filename` to each file tracer in turn; the first claim wins.
    ///
    /// `filename` must already be absolute and symlink-resolved. `None`
    /// means no plug-in wants the file.
    pub fn file_tracer(&self, filename: &Path) -> Result<Option<Disposition>> {
        for entry in self.file_tracer_entries() {
            let claimed = hook(&entry.name, "file_tracer", entry.plugin.file_tracer(filename))?;
            trace!(
                plugin = %entry.name,
                file = %filename.display(),
                claimed = claimed.is_some(),
                "file_tracer"
            );
            if let Some(tracer) = claimed {
                let disposition = Disposition::new(filename, &entry.name, tracer);
                debug!(
                    plugin = %entry.name,
                    file = %filename.display(),
                    source = %disposition.source_filename.display(),
                    dynamic = disposition.has_dynamic_filename,
                    "plugin claimed file"
                );
                return Ok(Some(disposition));
            }
        }
        Ok(None)
    }

    /// Ask the plug-in that traced `filename` for its reporter.
    ///
    /// `plugin` is the display name recorded when the file was measured. A
    /// plug-in answering nothing has broken the protocol, and that is an
    /// error.
    pub fn file_reporter(&self, plugin: &str, filename: &Path) -> Result<ReporterChoice> {
        let handler = self.get(plugin).ok_or_else(|| PluginError::UnknownPlugin {
            plugin: plugin.to_string(),
        })?;
        let choice = hook(plugin, "file_reporter", handler.file_reporter(filename))?;
        trace!(plugin, file = %filename.display(), found = choice.is_some(), "file_reporter");
        choice.ok_or_else(|| {
            PluginError::MissingReporter {
                plugin: plugin.to_string(),
                filename: filename.to_path_buf(),
            }
            .into()
        })
    }

    /// First label any dynamic context plug-in gives `frame`.
    pub fn dynamic_context(&self, frame: &dyn Frame) -> Result<Option<String>> {
        for entry in self.context_switchers() {
            let label = hook(&entry.name, "dynamic_context", entry.plugin.dynamic_context(frame))?;
            if let Some(label) = label {
                trace!(plugin = %entry.name, function = frame.function(), %label, "dynamic_context");
                return Ok(Some(label));
            }
        }
        Ok(None)
    }

    /// Executable files under `src_dir` according to every file tracer.
    ///
    /// Each result is paired with the display name of the plug-in that found
    /// it.
    pub fn find_executable_files(&self, src_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut found = Vec::new();
        for entry in self.file_tracer_entries() {
            let files = hook(
                &entry.name,
                "find_executable_files",
                entry.plugin.find_executable_files(src_dir),
            )?;
            debug!(plugin = %entry.name, dir = %src_dir.display(), files = files.len(), "find_executable_files");
            found.extend(files.into_iter().map(|f| (entry.name.clone(), f)));
        }
        Ok(found)
    }

    /// `sys_info` of every plug-in, keyed by display name.
    pub fn sys_info(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.plugin.sys_info()))
            .collect()
    }

    /// [`sys_info`](Plugins::sys_info) formatted for the debug output.
    pub fn render_sys_info(&self) -> String {
        let mut out = String::new();
        for (name, info) in self.sys_info() {
            out.push_str(&format!("-- sys: {name} --\n"));
            if info.is_empty() {
                out.push_str("    -none-\n");
            }
            let width = info.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
            for (key, value) in &info {
                out.push_str(&format!("    {key:>width$}: {value}\n"));
            }
        }
        out
    }
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugins")
            .field("names", &self.names().collect::<Vec<_>>())
            .field("file_tracers", &self.file_tracers.len())
            .field("configurers", &self.configurers.len())
            .field("context_switchers", &self.context_switchers.len())
            .finish()
    }
}

/// Handed to a plug-in module's init function to register its plug-ins.
///
/// ```
/// use covplug_core::{CoveragePlugin, PluginOptions, Registrar};
/// use std::rc::Rc;
///
/// struct Labeler;
/// impl CoveragePlugin for Labeler {}
///
/// fn coverage_init(reg: &mut Registrar<'_>, _options: &PluginOptions) -> eyre::Result<()> {
///     reg.add_dynamic_context(Rc::new(Labeler));
///     Ok(())
/// }
/// # let mut config = covplug_core::Config::new();
/// # let plugins = covplug_core::Plugins::load(&[("labels", coverage_init)], &mut config).unwrap();
/// # assert_eq!(plugins.names().collect::<Vec<_>>(), ["labels.Labeler"]);
/// ```
pub struct Registrar<'a> {
    plugins: &'a mut Plugins,
    module: &'a str,
    added: usize,
}

impl<'a> Registrar<'a> {
    pub fn new(plugins: &'a mut Plugins, module: &'a str) -> Self {
        Self {
            plugins,
            module,
            added: 0,
        }
    }

    /// Name of the module being loaded
    pub fn module(&self) -> &str {
        self.module
    }

    fn register<P: CoveragePlugin + 'static>(&mut self, plugin: Rc<P>) -> usize {
        let name = format!("{}.{}", self.module, short_type_name::<P>());
        self.added += 1;
        self.plugins.push(name, plugin)
    }

    /// Register a file tracer: it will be offered every executed file.
    pub fn add_file_tracer<P: CoveragePlugin + 'static>(&mut self, plugin: Rc<P>) {
        let idx = self.register(plugin);
        add_once(&mut self.plugins.file_tracers, idx);
    }

    /// Register a configurer: it will get to adjust the configuration once.
    pub fn add_configurer<P: CoveragePlugin + 'static>(&mut self, plugin: Rc<P>) {
        let idx = self.register(plugin);
        add_once(&mut self.plugins.configurers, idx);
    }

    /// Register a dynamic context switcher: it will label measured frames.
    pub fn add_dynamic_context<P: CoveragePlugin + 'static>(&mut self, plugin: Rc<P>) {
        let idx = self.register(plugin);
        add_once(&mut self.plugins.context_switchers, idx);
    }
}

fn add_once(capability: &mut Vec<usize>, idx: usize) {
    if !capability.contains(&idx) {
        capability.push(idx);
    }
}

/// The outcome of a successful `file_tracer` claim for one executed file.
pub struct Disposition {
    /// The executed file that was claimed
    pub original_filename: PathBuf,
    /// Canonical form of the tracer's `source_filename`. Only a fallback when
    /// [`has_dynamic_filename`](Disposition::has_dynamic_filename) is set.
    pub source_filename: PathBuf,
    /// Display name of the claiming plug-in
    pub plugin: String,
    /// Cached answer of `has_dynamic_source_filename`
    pub has_dynamic_filename: bool,
    tracer: Box<dyn FileTracer>,
}

impl Disposition {
    fn new(filename: &Path, plugin: &str, tracer: Box<dyn FileTracer>) -> Self {
        let has_dynamic_filename = tracer.has_dynamic_source_filename();
        Self {
            original_filename: filename.to_path_buf(),
            source_filename: canonical_filename(tracer.source_filename()),
            plugin: plugin.to_string(),
            has_dynamic_filename,
            tracer,
        }
    }

    pub fn tracer(&self) -> &dyn FileTracer {
        self.tracer.as_ref()
    }

    /// Source file to credit `frame` to, or `None` to skip the frame.
    ///
    /// The dynamic resolver only runs when the tracer asked for it at claim
    /// time. Its answer is canonicalized like the static name.
    pub fn source_for(&self, frame: &dyn Frame) -> Result<Option<PathBuf>> {
        if !self.has_dynamic_filename {
            return Ok(Some(self.source_filename.clone()));
        }
        let source = hook(
            &self.plugin,
            "dynamic_source_filename",
            self.tracer.dynamic_source_filename(&self.original_filename, frame),
        )?;
        Ok(source.map(canonical_filename))
    }

    /// Source lines `frame` executed, possibly [`LineRange::UNMEASURED`].
    pub fn line_range(&self, frame: &dyn Frame) -> Result<LineRange> {
        hook(&self.plugin, "line_number_range", self.tracer.line_number_range(frame))
    }
}

impl fmt::Debug for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposition")
            .field("original_filename", &self.original_filename)
            .field("source_filename", &self.source_filename)
            .field("plugin", &self.plugin)
            .field("has_dynamic_filename", &self.has_dynamic_filename)
            .finish_non_exhaustive()
    }
}
