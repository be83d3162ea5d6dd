//! The plug-in base trait
//!
//! A plug-in is one object that may take part in several phases of a
//! measurement run. Which phases it takes part in is decided by how its init
//! function registers it (see [`Registrar`](crate::Registrar)):
//!
//! - **File tracers** claim executed files with
//!   [`file_tracer`](CoveragePlugin::file_tracer) and later report on them
//!   with [`file_reporter`](CoveragePlugin::file_reporter).
//! - **Configurers** adjust the loaded configuration in
//!   [`configure`](CoveragePlugin::configure).
//! - **Dynamic context switchers** label measured frames in
//!   [`dynamic_context`](CoveragePlugin::dynamic_context).
//!
//! Any plug-in can describe itself through
//! [`sys_info`](CoveragePlugin::sys_info).
//!
//! Plug-ins are shared by every file they claim and are called from the
//! single measurement thread, so hooks take `&self`. Keep any mutable state
//! behind a `Cell` or `RefCell`.

use crate::config::{ConfigAccess, PluginOptions};
use crate::registry::Registrar;
use crate::reporter::ReporterChoice;
use crate::tracer::{FileTracer, Frame};
use eyre::Result;
use std::path::{Path, PathBuf};

/// Entry point of a plug-in module.
///
/// Receives the registrar and the module's own options from the configuration
/// file, and registers one or more plug-ins.
pub type PluginInit = fn(&mut Registrar<'_>, &PluginOptions) -> Result<()>;

/// Base trait for coverage plug-ins. Every hook has a "does nothing" default.
pub trait CoveragePlugin {
    /// Offer an executed file to the plug-in.
    ///
    /// Every executed file is offered, so expect most of them to be
    /// irrelevant and answer `None` quickly. `filename` is absolute and
    /// symlink-resolved; compare against paths in the same form.
    ///
    /// This runs on the measurement hot path. Don't do blocking I/O here.
    fn file_tracer(&self, _filename: &Path) -> Result<Option<Box<dyn FileTracer>>> {
        Ok(None)
    }

    /// Get the reporter for a file this plug-in claimed.
    ///
    /// Only called for files [`file_tracer`](CoveragePlugin::file_tracer)
    /// accepted. Answering `None` is a contract violation.
    fn file_reporter(&self, _filename: &Path) -> Result<Option<ReporterChoice>> {
        Ok(None)
    }

    /// Label to start a new dynamic context at `frame`, if any.
    ///
    /// Called on frame entry while no dynamic context is active. A label
    /// applies to this frame and everything it calls, until it returns.
    fn dynamic_context(&self, _frame: &dyn Frame) -> Result<Option<String>> {
        Ok(None)
    }

    /// Every file under `src_dir` this plug-in could have traced.
    ///
    /// Used to report files that never ran. Executed files are included.
    fn find_executable_files(&self, _src_dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    /// Adjust the configuration before measurement starts.
    ///
    /// Only `get_option` and `set_option` are available on `config`.
    fn configure(&self, _config: &mut dyn ConfigAccess) -> Result<()> {
        Ok(())
    }

    /// Name/value pairs shown by the host tool's debug output.
    fn sys_info(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tracer::FrameInfo;

    struct Inert;
    impl CoveragePlugin for Inert {}

    #[test]
    fn test_defaults_claim_nothing() {
        let plugin = Inert;
        let path = Path::new("/abs/file.py");
        assert!(plugin.file_tracer(path).unwrap().is_none());
        assert!(plugin.file_reporter(path).unwrap().is_none());
        assert!(
            plugin
                .dynamic_context(&FrameInfo::new(path, 1, "f"))
                .unwrap()
                .is_none()
        );
        assert!(plugin.find_executable_files(Path::new("/abs")).unwrap().is_empty());
        assert!(plugin.sys_info().is_empty());
    }

    #[test]
    fn test_default_configure_changes_nothing() {
        let mut config = Config::new();
        let before = config.option_names().len();
        Inert.configure(&mut config).unwrap();
        assert_eq!(config.option_names().len(), before);
        assert!(!config.branch());
    }
}
