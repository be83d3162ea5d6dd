//! covplug-core - Plug-in protocol for a code coverage measurement tool
//!
//! This crate provides the building blocks for:
//! - Writing plug-ins that measure non-native files, such as templates
//!   compiled into code the host language executes
//! - Loading plug-in modules and routing measurement and reporting through them
//! - Attributing executed lines and arcs to their real source files
//! - Summarizing what a file reporter says about a measured file
//!
//! # Features
//!
//! - `walk` - Enable [`files::ExecutableFiles`] for gitignore-aware discovery of
//!   unexecuted files (brings in `ignore` and `globset`)
//!
//! # Writing a Plug-in
//!
//! A plug-in module exposes one [`PluginInit`] function. The host calls it with
//! a [`Registrar`] and the module's options, and the function registers one or
//! more [`CoveragePlugin`] implementations:
//!
//! ```
//! use covplug_core::{
//!     Config, CoveragePlugin, FileReporter, FileTracer, LineNo, PluginOptions, Plugins,
//!     Registrar, ReporterChoice,
//! };
//! use std::collections::BTreeSet;
//! use std::path::{Path, PathBuf};
//! use std::rc::Rc;
//!
//! struct Templates;
//!
//! struct TemplateTracer(PathBuf);
//!
//! impl FileTracer for TemplateTracer {
//!     fn source_filename(&self) -> PathBuf {
//!         self.0.clone()
//!     }
//! }
//!
//! struct TemplateReporter(PathBuf);
//!
//! impl FileReporter for TemplateReporter {
//!     fn filename(&self) -> &Path {
//!         &self.0
//!     }
//!
//!     fn lines(&self) -> eyre::Result<BTreeSet<LineNo>> {
//!         Ok(BTreeSet::from([1, 2, 3]))
//!     }
//! }
//!
//! impl CoveragePlugin for Templates {
//!     fn file_tracer(&self, filename: &Path) -> eyre::Result<Option<Box<dyn FileTracer>>> {
//!         if filename.extension().is_some_and(|ext| ext == "tmpl") {
//!             return Ok(Some(Box::new(TemplateTracer(filename.to_path_buf()))));
//!         }
//!         Ok(None)
//!     }
//!
//!     fn file_reporter(&self, filename: &Path) -> eyre::Result<Option<ReporterChoice>> {
//!         Ok(Some(ReporterChoice::Plugin(Box::new(TemplateReporter(
//!             filename.to_path_buf(),
//!         )))))
//!     }
//! }
//!
//! fn coverage_init(reg: &mut Registrar<'_>, _options: &PluginOptions) -> eyre::Result<()> {
//!     reg.add_file_tracer(Rc::new(Templates));
//!     Ok(())
//! }
//!
//! let mut config = Config::new();
//! let plugins = Plugins::load(&[("templates", coverage_init)], &mut config).unwrap();
//! assert_eq!(plugins.names().collect::<Vec<_>>(), ["templates.Templates"]);
//!
//! let disposition = plugins.file_tracer(Path::new("/site/page.tmpl")).unwrap().unwrap();
//! assert_eq!(disposition.plugin, "templates.Templates");
//! ```
//!
//! # Measuring
//!
//! A [`Collector`] receives call/line/return events from the host tracer,
//! asks the plug-ins about each new file once, and records lines (and arcs,
//! with branch coverage on) against the source files the plug-ins name.
//!
//! # Reporting
//!
//! [`Plugins::file_reporter`] hands back the reporter for a claimed file, and
//! [`Analysis::compute`] combines it with the recorded [`CoverageData`]:
//!
//! ```ignore
//! let data = collector.into_data();
//! for file in data.measured_files() {
//!     if let Some(plugin) = data.file_tracer(file) {
//!         if let ReporterChoice::Plugin(reporter) = plugins.file_reporter(plugin, file)? {
//!             let analysis = Analysis::compute(reporter.as_ref(), &data)?;
//!             println!("{}: {:.1}%", file.display(), analysis.percent_covered());
//!         }
//!     }
//! }
//! ```

mod collector;
mod config;
mod coverage;
mod error;
pub mod files;
mod plugin;
mod registry;
mod reporter;
mod tokens;
mod tracer;

pub use collector::{Collector, CoverageData, FileData, Measured};
pub use config::{Config, ConfigAccess, OptionValue, PluginOptions};
pub use coverage::{Analysis, Numbers};
pub use error::{ConfigError, PluginError};
pub use plugin::{CoveragePlugin, PluginInit};
pub use registry::{Disposition, Plugins, Registrar};
pub use reporter::{FileReporter, LineArc, ReporterChoice, TokenLines, exit_counts_from_arcs};
pub use tokens::{PlainTokenLines, Token, TokenClass, TokenLine, join_token_lines};
pub use tracer::{FileTracer, Frame, FrameInfo, LineNo, LineRange};
