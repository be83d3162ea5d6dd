//! Recording what plug-in-traced frames executed
//!
//! The instrumentation engine owns the actual tracing hook. It feeds frame
//! events into a [`Collector`], which runs the execution-phase protocol
//! against the registered plug-ins and accumulates [`CoverageData`].

use crate::config::Config;
use crate::registry::{Disposition, Plugins};
use crate::reporter::LineArc;
use crate::tracer::{Frame, LineNo};
use eyre::Result;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, trace};

/// Lines and arcs recorded for one source file under one context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measured {
    pub lines: BTreeSet<LineNo>,
    pub arcs: BTreeSet<LineArc>,
}

/// Everything recorded for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    /// Display name of the plug-in that traced the file
    pub plugin: String,
    /// Measurements by dynamic context label; `""` when no context was active
    pub contexts: BTreeMap<String, Measured>,
}

/// Recorded coordinates, keyed by source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageData {
    files: BTreeMap<PathBuf, FileData>,
}

impl CoverageData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source files with any recorded data, sorted
    pub fn measured_files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn file(&self, source: &Path) -> Option<&FileData> {
        self.files.get(source)
    }

    /// Display name of the plug-in that traced `source`
    pub fn file_tracer(&self, source: &Path) -> Option<&str> {
        self.files.get(source).map(|f| f.plugin.as_str())
    }

    /// Recorded lines of `source` across all contexts
    pub fn lines(&self, source: &Path) -> BTreeSet<LineNo> {
        self.files
            .get(source)
            .map(|f| f.contexts.values().flat_map(|m| m.lines.iter().copied()).collect())
            .unwrap_or_default()
    }

    /// Recorded arcs of `source` across all contexts
    pub fn arcs(&self, source: &Path) -> BTreeSet<LineArc> {
        self.files
            .get(source)
            .map(|f| f.contexts.values().flat_map(|m| m.arcs.iter().copied()).collect())
            .unwrap_or_default()
    }

    /// Context labels that recorded anything in `source`
    pub fn contexts(&self, source: &Path) -> Vec<&str> {
        self.files
            .get(source)
            .map(|f| f.contexts.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn entry(&mut self, source: &Path, plugin: &str, context: &str) -> &mut Measured {
        let file = self
            .files
            .entry(source.to_path_buf())
            .or_insert_with(|| FileData {
                plugin: plugin.to_string(),
                contexts: BTreeMap::new(),
            });
        file.contexts.entry(context.to_string()).or_default()
    }

    pub fn add_lines(&mut self, source: &Path, plugin: &str, context: &str, lines: impl IntoIterator<Item = LineNo>) {
        self.entry(source, plugin, context).lines.extend(lines);
    }

    pub fn add_arc(&mut self, source: &Path, plugin: &str, context: &str, arc: LineArc) {
        self.entry(source, plugin, context).arcs.insert(arc);
    }
}

/// Where the frame last executed measured code.
#[derive(Debug)]
struct Position {
    disposition: Rc<Disposition>,
    source: PathBuf,
    last_line: LineNo,
}

#[derive(Debug, Default)]
struct FrameState {
    position: Option<Position>,
}

/// Runs the execution-phase protocol for a stream of frame events.
///
/// Events must arrive in call order from the single measurement thread:
/// [`call`](Collector::call) when a frame starts, [`line`](Collector::line)
/// for each line event, [`ret`](Collector::ret) when it returns.
#[derive(Debug)]
pub struct Collector<'p> {
    plugins: &'p Plugins,
    branch: bool,
    dispositions: HashMap<PathBuf, Option<Rc<Disposition>>>,
    stack: Vec<FrameState>,
    /// Active dynamic context and the stack depth of the frame that started it
    context: Option<(String, usize)>,
    data: CoverageData,
}

impl<'p> Collector<'p> {
    /// A collector measuring branches when `run:branch` is set.
    pub fn new(plugins: &'p Plugins, config: &Config) -> Self {
        Self {
            plugins,
            branch: config.branch(),
            dispositions: HashMap::new(),
            stack: Vec::new(),
            context: None,
            data: CoverageData::new(),
        }
    }

    /// Override whether arcs are recorded
    pub fn with_branch(mut self, branch: bool) -> Self {
        self.branch = branch;
        self
    }

    /// The active dynamic context label, if any
    pub fn current_context(&self) -> Option<&str> {
        self.context.as_ref().map(|(label, _)| label.as_str())
    }

    /// Disposition for an executed file, asking the plug-ins only the first
    /// time the file is seen.
    pub fn should_trace(&mut self, filename: &Path) -> Result<Option<Rc<Disposition>>> {
        if let Some(known) = self.dispositions.get(filename) {
            return Ok(known.clone());
        }
        let disposition = self.plugins.file_tracer(filename)?.map(Rc::new);
        self.dispositions
            .insert(filename.to_path_buf(), disposition.clone());
        Ok(disposition)
    }

    /// A frame was entered.
    pub fn call(&mut self, frame: &dyn Frame) -> Result<()> {
        self.stack.push(FrameState::default());
        if self.context.is_none() && self.plugins.has_dynamic_contexts() {
            if let Some(label) = self.plugins.dynamic_context(frame)? {
                debug!(%label, function = frame.function(), "dynamic context started");
                self.context = Some((label, self.stack.len()));
            }
        }
        Ok(())
    }

    /// A frame executed a line.
    pub fn line(&mut self, frame: &dyn Frame) -> Result<()> {
        if self.stack.is_empty() {
            // Measurement began inside an already running frame.
            self.stack.push(FrameState::default());
        }
        let Some(disposition) = self.should_trace(frame.filename())? else {
            return Ok(());
        };
        let Some(source) = disposition.source_for(frame)? else {
            trace!(file = %frame.filename().display(), line = frame.line(), "frame not measured");
            return Ok(());
        };
        let range = disposition.line_range(frame)?;
        if range.is_unmeasured() {
            trace!(file = %frame.filename().display(), line = frame.line(), "no measurable line");
            return Ok(());
        }

        let context = self.context_label();
        let plugin = disposition.plugin.clone();
        self.data.add_lines(&source, &plugin, &context, range.lines());

        let state = self.stack.last_mut().and_then(|s| s.position.take());
        let prev = match state {
            Some(pos) if pos.source == source => pos.last_line,
            Some(pos) => {
                // Same frame, different logical source: leave the old one.
                if self.branch {
                    self.data
                        .add_arc(&pos.source, &pos.disposition.plugin, &context, (pos.last_line, -1));
                }
                -1
            }
            None => -1,
        };
        if self.branch {
            self.data.add_arc(&source, &plugin, &context, (prev, range.start));
        }
        if let Some(top) = self.stack.last_mut() {
            top.position = Some(Position {
                disposition,
                source,
                last_line: range.end,
            });
        }
        Ok(())
    }

    /// A frame returned.
    pub fn ret(&mut self, _frame: &dyn Frame) -> Result<()> {
        let depth = self.stack.len();
        if let Some(state) = self.stack.pop() {
            if let (true, Some(pos)) = (self.branch, state.position) {
                let context = self.context_label();
                self.data
                    .add_arc(&pos.source, &pos.disposition.plugin, &context, (pos.last_line, -1));
            }
        }
        if self.context.as_ref().is_some_and(|&(_, started)| started == depth) {
            if let Some((label, _)) = self.context.take() {
                debug!(%label, "dynamic context ended");
            }
        }
        Ok(())
    }

    fn context_label(&self) -> String {
        self.context
            .as_ref()
            .map(|(label, _)| label.clone())
            .unwrap_or_default()
    }

    pub fn data(&self) -> &CoverageData {
        &self.data
    }

    /// Finish measuring and hand over what was recorded
    pub fn into_data(self) -> CoverageData {
        self.data
    }
}
