//! Analysis-phase support: describing an original source file

use crate::files;
use crate::tokens::{PlainTokenLines, TokenLine};
use crate::tracer::LineNo;
use eyre::{Result, WrapErr};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// A possible transition from one line to another, `(prev, next)`.
///
/// A negative endpoint is a synthetic entry into or exit from the enclosing
/// code unit.
pub type LineArc = (LineNo, LineNo);

/// Lazily produced token lines, one element per source line.
pub type TokenLines<'a> = Box<dyn Iterator<Item = TokenLine> + 'a>;

/// What a plug-in hands back from `file_reporter`.
#[derive(Debug)]
pub enum ReporterChoice {
    /// The plug-in reports on the file itself
    Plugin(Box<dyn FileReporter>),
    /// Treat the file as the engine's native text format
    Native,
}

/// Per-file support for the analysis and reporting phases.
///
/// Only [`filename`](FileReporter::filename) and
/// [`lines`](FileReporter::lines) are required. Everything else has a default
/// that means "no enhancement of this facet".
///
/// Reporters compare equal when their file names are equal, and sort by file
/// name. They are deliberately not hashable: key maps on
/// [`filename`](FileReporter::filename) instead.
pub trait FileReporter {
    /// The file being reported on. The identity of the reporter.
    fn filename(&self) -> &Path;

    /// Path to display in reports.
    fn relative_filename(&self) -> PathBuf {
        files::relative_filename(self.filename())
    }

    /// Full text of the file.
    ///
    /// The default reads [`filename`](FileReporter::filename) as UTF-8.
    /// Override for other encodings or non-file backing stores.
    fn source(&self) -> Result<String> {
        let bytes = std::fs::read(self.filename())
            .wrap_err_with(|| format!("Failed to read {}", self.filename().display()))?;
        String::from_utf8(bytes)
            .wrap_err_with(|| format!("{} is not valid UTF-8", self.filename().display()))
    }

    /// The executable lines of the file.
    fn lines(&self) -> Result<BTreeSet<LineNo>>;

    /// Executable lines the user asked to leave out.
    fn excluded_lines(&self) -> Result<BTreeSet<LineNo>> {
        Ok(BTreeSet::new())
    }

    /// Lines excused from branch coverage.
    fn no_branch_lines(&self) -> Result<BTreeSet<LineNo>> {
        Ok(BTreeSet::new())
    }

    /// Map recorded line numbers to reported ones.
    ///
    /// Formats that record the last line of a multi-line statement but want to
    /// report its first line do that here. Must accept anything the matching
    /// tracer can record.
    fn translate_lines(&self, lines: &BTreeSet<LineNo>) -> BTreeSet<LineNo> {
        lines.clone()
    }

    /// Possible execution paths, for branch coverage.
    fn arcs(&self) -> Result<BTreeSet<LineArc>> {
        Ok(BTreeSet::new())
    }

    /// Arc counterpart of [`translate_lines`](FileReporter::translate_lines).
    fn translate_arcs(&self, arcs: &BTreeSet<LineArc>) -> BTreeSet<LineArc> {
        arcs.clone()
    }

    /// Number of distinct exits from each line.
    ///
    /// Derived from [`arcs`](FileReporter::arcs) by default; see
    /// [`exit_counts_from_arcs`].
    fn exit_counts(&self) -> Result<BTreeMap<LineNo, usize>> {
        Ok(exit_counts_from_arcs(&self.arcs()?))
    }

    /// Lines with more than one exit that aren't excused from branch coverage.
    fn branch_lines(&self) -> Result<BTreeSet<LineNo>> {
        let no_branch = self.no_branch_lines()?;
        Ok(self
            .exit_counts()?
            .into_iter()
            .filter(|&(line, count)| count > 1 && !no_branch.contains(&line))
            .map(|(line, _)| line)
            .collect())
    }

    /// One English sentence explaining why the arc `start -> end` never ran.
    ///
    /// `executed_arcs` are the arcs that did run in this file, for phrasing
    /// that depends on what else happened.
    fn missing_arc_description(
        &self,
        start: LineNo,
        end: LineNo,
        _executed_arcs: Option<&BTreeSet<LineArc>>,
    ) -> String {
        format!("Line {start} didn't jump to line {end}")
    }

    /// Syntax tokens, one list per line of [`source`](FileReporter::source).
    ///
    /// Concatenating each line's token texts and joining the lines with `\n`
    /// must reproduce the source. Each call starts over from the source. The
    /// default tags every line wholly as text.
    fn source_token_lines(&self) -> Result<TokenLines<'_>> {
        Ok(Box::new(PlainTokenLines::new(self.source()?)))
    }
}

/// For every real line that starts an arc, the number of distinct lines it
/// can go to. Synthetic (negative) starting points are not lines and are not
/// counted.
pub fn exit_counts_from_arcs(arcs: &BTreeSet<LineArc>) -> BTreeMap<LineNo, usize> {
    let mut counts = BTreeMap::new();
    // BTreeSet deduplicates pairs, so each (prev, next) contributes once.
    for &(prev, _) in arcs {
        if prev >= 0 {
            *counts.entry(prev).or_insert(0) += 1;
        }
    }
    counts
}

impl PartialEq for dyn FileReporter + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.filename().as_os_str() == other.filename().as_os_str()
    }
}

impl Eq for dyn FileReporter + '_ {}

impl PartialOrd for dyn FileReporter + '_ {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for dyn FileReporter + '_ {
    fn cmp(&self, other: &Self) -> Ordering {
        self.filename().as_os_str().cmp(other.filename().as_os_str())
    }
}

impl fmt::Debug for dyn FileReporter + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<FileReporter filename={:?}>", self.filename())
    }
}
