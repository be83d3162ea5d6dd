//! Coverage analysis of one source file from its reporter and recorded data

use crate::collector::CoverageData;
use crate::reporter::{FileReporter, LineArc};
use crate::tracer::LineNo;
use eyre::Result;
use facet::Facet;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;
use std::path::PathBuf;
use tracing::warn;

/// Counts behind a coverage percentage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Facet)]
pub struct Numbers {
    pub n_files: usize,
    pub n_statements: usize,
    pub n_excluded: usize,
    pub n_missing: usize,
    pub n_branches: usize,
    pub n_partial_branches: usize,
    pub n_missing_branches: usize,
}

impl Numbers {
    pub fn n_executed(&self) -> usize {
        self.n_statements.saturating_sub(self.n_missing)
    }

    pub fn n_executed_branches(&self) -> usize {
        self.n_branches.saturating_sub(self.n_missing_branches)
    }

    /// Coverage percentage (0.0 - 100.0), counting branches when present
    pub fn percent_covered(&self) -> f64 {
        let denominator = self.n_statements + self.n_branches;
        if denominator == 0 {
            return 100.0;
        }
        let numerator = self.n_executed() + self.n_executed_branches();
        (numerator as f64 / denominator as f64) * 100.0
    }
}

impl AddAssign for Numbers {
    fn add_assign(&mut self, other: Numbers) {
        self.n_files += other.n_files;
        self.n_statements += other.n_statements;
        self.n_excluded += other.n_excluded;
        self.n_missing += other.n_missing;
        self.n_branches += other.n_branches;
        self.n_partial_branches += other.n_partial_branches;
        self.n_missing_branches += other.n_missing_branches;
    }
}

/// Reported coverage of one source file
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub filename: PathBuf,
    /// Executable lines, minus excluded ones
    pub statements: BTreeSet<LineNo>,
    pub excluded: BTreeSet<LineNo>,
    /// Statements that ran, in reported coordinates
    pub executed: BTreeSet<LineNo>,
    /// Statements that never ran
    pub missing: BTreeSet<LineNo>,
    /// Translated lines that the reporter doesn't consider executable
    pub unpredicted: BTreeSet<LineNo>,
    /// Whether the reporter supports branch coverage for this file
    pub has_arcs: bool,
    pub arc_possibilities: BTreeSet<LineArc>,
    /// Arcs that ran, in reported coordinates
    pub arcs_executed: BTreeSet<LineArc>,
    pub exit_counts: BTreeMap<LineNo, usize>,
    pub no_branch: BTreeSet<LineNo>,
}

impl Analysis {
    /// Analyze `reporter`'s file using what `data` recorded for it
    pub fn compute(reporter: &dyn FileReporter, data: &CoverageData) -> Result<Self> {
        let filename = reporter.filename();
        Self::from_recorded(reporter, &data.lines(filename), &data.arcs(filename))
    }

    /// Analyze `reporter`'s file given recorded (untranslated) lines and arcs
    pub fn from_recorded(
        reporter: &dyn FileReporter,
        recorded_lines: &BTreeSet<LineNo>,
        recorded_arcs: &BTreeSet<LineArc>,
    ) -> Result<Self> {
        let lines = reporter.lines()?;
        let excluded = reporter.excluded_lines()?;
        let statements: BTreeSet<LineNo> = lines.difference(&excluded).copied().collect();

        let translated = reporter.translate_lines(recorded_lines);
        let executed: BTreeSet<LineNo> = translated.intersection(&statements).copied().collect();
        let missing: BTreeSet<LineNo> = statements.difference(&executed).copied().collect();
        let unpredicted: BTreeSet<LineNo> = translated.difference(&lines).copied().collect();
        if !unpredicted.is_empty() {
            warn!(
                file = %reporter.filename().display(),
                lines = ?unpredicted,
                "recorded lines are not executable according to the reporter"
            );
        }

        let arc_possibilities = reporter.arcs()?;
        let has_arcs = !arc_possibilities.is_empty();
        let (arcs_executed, exit_counts, no_branch) = if has_arcs {
            (
                reporter.translate_arcs(recorded_arcs),
                reporter.exit_counts()?,
                reporter.no_branch_lines()?,
            )
        } else {
            (BTreeSet::new(), BTreeMap::new(), BTreeSet::new())
        };

        Ok(Self {
            filename: reporter.filename().to_path_buf(),
            statements,
            excluded,
            executed,
            missing,
            unpredicted,
            has_arcs,
            arc_possibilities,
            arcs_executed,
            exit_counts,
            no_branch,
        })
    }

    /// Possible arcs that never ran.
    ///
    /// Arcs out of no-branch lines and arcs into excluded lines don't count.
    pub fn arcs_missing(&self) -> BTreeSet<LineArc> {
        self.arc_possibilities
            .iter()
            .filter(|&&(from, to)| {
                !self.arcs_executed.contains(&(from, to))
                    && !self.no_branch.contains(&from)
                    && !self.excluded.contains(&to)
            })
            .copied()
            .collect()
    }

    /// Executed arcs the reporter didn't predict
    pub fn arcs_unpredicted(&self) -> BTreeSet<LineArc> {
        self.arcs_executed
            .iter()
            .filter(|&&(from, to)| {
                !self.arc_possibilities.contains(&(from, to)) && from != to && (from > 0 || to > 0)
            })
            .copied()
            .collect()
    }

    /// Lines with more than one exit
    pub fn branch_lines(&self) -> BTreeSet<LineNo> {
        self.exit_counts
            .iter()
            .filter(|&(line, &count)| count > 1 && !self.no_branch.contains(line))
            .map(|(&line, _)| line)
            .collect()
    }

    /// Possible arcs out of branch lines, counted the same way
    /// [`arcs_missing`](Analysis::arcs_missing) counts, so missing branches
    /// never outnumber branches even when `exit_counts` disagrees with `arcs`.
    fn total_branches(&self) -> usize {
        let branch_lines = self.branch_lines();
        self.arc_possibilities
            .iter()
            .filter(|(from, to)| branch_lines.contains(from) && !self.excluded.contains(to))
            .count()
    }

    /// Missing arcs out of branch lines, grouped by starting line
    pub fn missing_branch_arcs(&self) -> BTreeMap<LineNo, Vec<LineNo>> {
        let branch_lines = self.branch_lines();
        let mut grouped: BTreeMap<LineNo, Vec<LineNo>> = BTreeMap::new();
        for (from, to) in self.arcs_missing() {
            if branch_lines.contains(&from) {
                grouped.entry(from).or_default().push(to);
            }
        }
        grouped
    }

    /// Executed arcs out of branch lines, grouped by starting line
    pub fn executed_branch_arcs(&self) -> BTreeMap<LineNo, Vec<LineNo>> {
        let branch_lines = self.branch_lines();
        let mut grouped: BTreeMap<LineNo, Vec<LineNo>> = BTreeMap::new();
        for &(from, to) in &self.arcs_executed {
            if branch_lines.contains(&from) && self.arc_possibilities.contains(&(from, to)) {
                grouped.entry(from).or_default().push(to);
            }
        }
        grouped
    }

    pub fn numbers(&self) -> Numbers {
        let (n_branches, n_partial_branches, n_missing_branches) = if self.has_arcs {
            let missing = self.missing_branch_arcs();
            let partial = missing
                .keys()
                .filter(|&line| !self.missing.contains(line))
                .count();
            (
                self.total_branches(),
                partial,
                missing.values().map(Vec::len).sum(),
            )
        } else {
            (0, 0, 0)
        };
        Numbers {
            n_files: 1,
            n_statements: self.statements.len(),
            n_excluded: self.excluded.len(),
            n_missing: self.missing.len(),
            n_branches,
            n_partial_branches,
            n_missing_branches,
        }
    }

    /// Coverage percentage (0.0 - 100.0); an empty file is fully covered
    pub fn percent_covered(&self) -> f64 {
        self.numbers().percent_covered()
    }

    /// The reporter's explanation for each missing arc, in arc order.
    pub fn missing_descriptions(&self, reporter: &dyn FileReporter) -> Vec<(LineArc, String)> {
        self.arcs_missing()
            .into_iter()
            .map(|(from, to)| {
                let text = reporter.missing_arc_description(from, to, Some(&self.arcs_executed));
                ((from, to), text)
            })
            .collect()
    }

    /// Missing lines as compact ranges, e.g. `"11, 20-22"`.
    ///
    /// A range runs over consecutive statements, so non-executable lines
    /// inside it don't break it. With branch data, partially executed branch
    /// lines are appended as `"12->15"` (`"12->exit"` for a negative target).
    pub fn render_missing_lines(&self) -> String {
        let mut parts = Vec::new();
        let mut run: Option<(LineNo, LineNo)> = None;
        for &line in &self.statements {
            if self.missing.contains(&line) {
                run = Some(match run {
                    Some((start, _)) => (start, line),
                    None => (line, line),
                });
            } else if let Some(range) = run.take() {
                parts.push(format_range(range));
            }
        }
        if let Some(range) = run {
            parts.push(format_range(range));
        }

        if self.has_arcs {
            for (from, targets) in self.missing_branch_arcs() {
                if self.missing.contains(&from) {
                    continue;
                }
                for to in targets {
                    if to < 0 {
                        parts.push(format!("{from}->exit"));
                    } else {
                        parts.push(format!("{from}->{to}"));
                    }
                }
            }
        }
        parts.join(", ")
    }
}

fn format_range((start, end): (LineNo, LineNo)) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}
