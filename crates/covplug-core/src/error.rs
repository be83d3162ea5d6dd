//! Contract violations raised by the plug-in registry

use std::path::PathBuf;

/// A plug-in broke the protocol it registered for.
///
/// These are programming errors in the plug-in, not data conditions, so the
/// registry never recovers from them.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// `file_reporter` answered nothing for a file the same plug-in claimed.
    #[error("Plugin {plugin:?} did not provide a file reporter for {filename:?}")]
    MissingReporter { plugin: String, filename: PathBuf },

    /// A plug-in module's init function registered no plug-ins at all.
    #[error("Plugin module {module:?} didn't define any plugins")]
    NoPluginsDefined { module: String },

    /// A recorded plug-in name that no loaded module registered.
    #[error("No plugin named {plugin:?} is registered")]
    UnknownPlugin { plugin: String },

    /// A plug-in hook failed. Wraps the plug-in's own error.
    #[error("Plugin {plugin:?} failed in {method}()")]
    Hook {
        plugin: String,
        method: &'static str,
        #[source]
        source: eyre::Report,
    },
}

/// Errors from reading or writing configuration options.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("No such option: {0:?}")]
    UnknownOption(String),

    #[error("Option {option:?} expects a {expected} value, got {found}")]
    TypeMismatch {
        option: String,
        expected: &'static str,
        found: &'static str,
    },
}
