//! File-name utilities shared by the engine and plug-ins

#[cfg(feature = "walk")]
use eyre::Result;
use std::path::{Component, Path, PathBuf};

/// Absolute, symlink-resolved form of `path`.
///
/// Every file-identifying path handed to a plug-in goes through here. When the
/// file doesn't exist (a template that was deleted after compiling, say) the
/// path is made absolute against the current directory and normalized
/// lexically instead.
pub fn canonical_filename(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    normalize(&absolute)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Relativizes paths against a project root for display in reports.
#[derive(Debug, Clone)]
pub struct RelativeDirectory {
    root: PathBuf,
}

impl RelativeDirectory {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: canonical_filename(root),
        }
    }

    /// The project root for the current process
    pub fn current() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the root, or `path` unchanged when it lies outside.
    pub fn relative_filename(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.root) {
            Ok(relative) if !relative.as_os_str().is_empty() => relative.to_path_buf(),
            _ => path.to_path_buf(),
        }
    }
}

/// Shorthand for [`RelativeDirectory::current`] + `relative_filename`
pub fn relative_filename(path: &Path) -> PathBuf {
    RelativeDirectory::current().relative_filename(path)
}

/// Gitignore-aware walker used to implement `find_executable_files`.
///
/// Include patterns are globs relative to the walked directory, e.g.
/// `**/*.tmpl`. With no include patterns every file is a candidate.
#[cfg(feature = "walk")]
#[derive(Debug, Clone)]
pub struct ExecutableFiles {
    root: PathBuf,
    include: Vec<String>,
    exclude: Vec<String>,
}

#[cfg(feature = "walk")]
impl ExecutableFiles {
    /// Create a walker for the given root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Add include patterns (e.g., `["**/*.tmpl"]`)
    pub fn include(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add exclude patterns (e.g., `["build/**"]`)
    pub fn exclude(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Walk the tree, returning matching files as sorted canonical paths.
    pub fn find(&self) -> Result<Vec<PathBuf>> {
        use ignore::WalkBuilder;

        let include = build_globset(&self.include)?;
        let exclude = build_globset(&self.exclude)?;

        let mut found: Vec<PathBuf> = WalkBuilder::new(&self.root)
            .follow_links(true)
            .hidden(false)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .build()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| {
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                (self.include.is_empty() || include.is_match(relative))
                    && !exclude.is_match(relative)
            })
            .map(|entry| canonical_filename(entry.path()))
            .collect();

        found.sort();
        tracing::debug!(
            root = %self.root.display(),
            files = found.len(),
            "found executable files"
        );
        Ok(found)
    }
}

#[cfg(feature = "walk")]
fn build_globset(patterns: &[String]) -> Result<globset::GlobSet> {
    use eyre::WrapErr;

    let mut builder = globset::GlobSetBuilder::new();
    for pattern in patterns {
        let glob = globset::Glob::new(&pattern.replace('\\', "/"))
            .wrap_err_with(|| format!("Invalid glob pattern {pattern:?}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
