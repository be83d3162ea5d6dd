//! Execution-phase support: attributing live frames to source lines

use eyre::Result;
use std::path::{Path, PathBuf};

/// A line number in some source file.
///
/// Negative values never name a real line; they mark synthetic entry and exit
/// points in arcs.
pub type LineNo = i32;

/// The engine's view of a stack frame that is currently executing.
pub trait Frame {
    /// Absolute path of the file the frame's code was loaded from
    fn filename(&self) -> &Path;

    /// Line currently executing, in the executed file's numbering
    fn line(&self) -> LineNo;

    /// Name of the function or code unit the frame is running
    fn function(&self) -> &str;
}

/// An owned [`Frame`], for engines that snapshot frames and for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    pub filename: PathBuf,
    pub line: LineNo,
    pub function: String,
}

impl FrameInfo {
    pub fn new(filename: impl Into<PathBuf>, line: LineNo, function: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            line,
            function: function.into(),
        }
    }

    /// Same frame, moved to another line
    pub fn at(&self, line: LineNo) -> Self {
        Self {
            line,
            ..self.clone()
        }
    }
}

impl Frame for FrameInfo {
    fn filename(&self) -> &Path {
        &self.filename
    }

    fn line(&self) -> LineNo {
        self.line
    }

    fn function(&self) -> &str {
        &self.function
    }
}

/// Inclusive range of source lines a frame event corresponds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LineRange {
    pub start: LineNo,
    pub end: LineNo,
}

impl LineRange {
    /// "This event executed no measurable line."
    pub const UNMEASURED: LineRange = LineRange { start: -1, end: -1 };

    pub fn new(start: LineNo, end: LineNo) -> Self {
        Self { start, end }
    }

    /// A range covering exactly one line
    pub fn single(line: LineNo) -> Self {
        Self::new(line, line)
    }

    pub fn is_unmeasured(&self) -> bool {
        *self == Self::UNMEASURED
    }

    /// Every line in the range, or nothing for the unmeasured sentinel
    pub fn lines(&self) -> impl Iterator<Item = LineNo> {
        let (start, end) = if self.is_unmeasured() {
            (1, 0)
        } else {
            (self.start, self.end)
        };
        start..=end
    }
}

impl From<(LineNo, LineNo)> for LineRange {
    fn from((start, end): (LineNo, LineNo)) -> Self {
        Self::new(start, end)
    }
}

/// Per-file execution support, created by a plug-in's `file_tracer` claim.
///
/// A tracer owns the mapping from one executed file to the source file (or
/// files) it came from. See [`source_filename`](FileTracer::source_filename)
/// for static mappings and
/// [`dynamic_source_filename`](FileTracer::dynamic_source_filename) for files
/// that execute many logical sources.
pub trait FileTracer {
    /// The source file to credit with this execution.
    ///
    /// For tracers with dynamic source file names this is only the fallback
    /// identity.
    fn source_filename(&self) -> PathBuf;

    /// Whether [`dynamic_source_filename`](FileTracer::dynamic_source_filename)
    /// needs calling at all.
    ///
    /// Asked once per claim; the answer is cached by the caller. The dynamic
    /// resolver is relatively expensive and is never invoked when this is
    /// false.
    fn has_dynamic_source_filename(&self) -> bool {
        false
    }

    /// The source file for this particular frame.
    ///
    /// `None` means the frame shouldn't be measured at all. Must depend only
    /// on `(filename, frame)`; callers don't memoize.
    fn dynamic_source_filename(&self, _filename: &Path, _frame: &dyn Frame) -> Result<Option<PathBuf>> {
        Ok(None)
    }

    /// Source lines the frame's current instruction corresponds to.
    ///
    /// Return [`LineRange::UNMEASURED`] when nothing measurable executed.
    fn line_number_range(&self, frame: &dyn Frame) -> Result<LineRange> {
        Ok(LineRange::single(frame.line()))
    }
}
