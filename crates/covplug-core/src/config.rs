//! Measurement configuration as seen by configurer plug-ins
//!
//! Loading the configuration file is the host tool's business. By the time
//! plug-ins see a [`Config`] it is fully populated; configurers may only read
//! and write the options it already recognizes.

use crate::error::ConfigError;
use eyre::{Result, WrapErr};
use facet::Facet;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A single configuration value
#[derive(Debug, Clone, PartialEq, Facet)]
#[repr(u8)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl OptionValue {
    /// Name of the value's kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Str(_) => "string",
            OptionValue::List(_) => "list",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            OptionValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Str(s) => f.write_str(s),
            OptionValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        OptionValue::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<Vec<String>> for OptionValue {
    fn from(value: Vec<String>) -> Self {
        OptionValue::List(value)
    }
}

/// The only surface a configurer plug-in gets to touch.
///
/// Option names are `"section:option"`, e.g. `"run:branch"` or
/// `"report:exclude_lines"`.
pub trait ConfigAccess {
    /// Read a recognized option.
    fn get_option(&self, name: &str) -> Result<OptionValue, ConfigError>;

    /// Overwrite a recognized option. The new value must be of the same kind.
    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), ConfigError>;
}

/// Options from a plug-in's own configuration section, verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct PluginOptions {
    pub options: BTreeMap<String, String>,
}

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an option
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    /// Parse an options table from JSON (`{"options": {"name": "value"}}`)
    pub fn from_json(json: &str) -> Result<Self> {
        facet_json::from_str(json).wrap_err("Failed to parse plugin options JSON")
    }
}

/// Fully loaded measurement configuration.
#[derive(Debug, Clone, Facet)]
pub struct Config {
    /// Recognized options keyed by `"section:option"`
    options: HashMap<String, OptionValue>,
    /// Per-module plug-in options
    plugin_options: HashMap<String, PluginOptions>,
}

impl Config {
    /// Configuration with the options every measurement run recognizes.
    pub fn new() -> Self {
        let mut options = HashMap::new();
        options.insert("run:branch".to_string(), OptionValue::Bool(false));
        options.insert("run:dynamic_context".to_string(), OptionValue::Str(String::new()));
        options.insert("run:source".to_string(), OptionValue::List(Vec::new()));
        options.insert("run:omit".to_string(), OptionValue::List(Vec::new()));
        options.insert("run:debug".to_string(), OptionValue::List(Vec::new()));
        options.insert(
            "report:exclude_lines".to_string(),
            OptionValue::List(vec!["#\\s*(pragma|PRAGMA)[:\\s]?\\s*(no|NO)\\s*(cover|COVER)".to_string()]),
        );
        options.insert("report:partial_branches".to_string(), OptionValue::List(Vec::new()));
        options.insert("report:precision".to_string(), OptionValue::Int(0));
        options.insert("report:show_missing".to_string(), OptionValue::Bool(false));
        Self {
            options,
            plugin_options: HashMap::new(),
        }
    }

    /// Register an extra recognized option with its initial value.
    pub fn define_option(&mut self, name: impl Into<String>, value: impl Into<OptionValue>) {
        self.options.insert(name.into(), value.into());
    }

    /// Names of all recognized options, sorted
    pub fn option_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.options.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Options for a plug-in module (empty when the section is absent)
    pub fn plugin_options(&self, module: &str) -> PluginOptions {
        self.plugin_options.get(module).cloned().unwrap_or_default()
    }

    pub fn set_plugin_options(&mut self, module: impl Into<String>, options: PluginOptions) {
        self.plugin_options.insert(module.into(), options);
    }

    /// Whether branch measurement is on
    pub fn branch(&self) -> bool {
        self.options
            .get("run:branch")
            .and_then(OptionValue::as_bool)
            .unwrap_or(false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigAccess for Config {
    fn get_option(&self, name: &str) -> Result<OptionValue, ConfigError> {
        self.options
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownOption(name.to_string()))
    }

    fn set_option(&mut self, name: &str, value: OptionValue) -> Result<(), ConfigError> {
        let slot = self
            .options
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownOption(name.to_string()))?;
        if std::mem::discriminant(slot) != std::mem::discriminant(&value) {
            return Err(ConfigError::TypeMismatch {
                option: name.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }
        *slot = value;
        Ok(())
    }
}
