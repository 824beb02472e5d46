//! Path filters deciding which changed files get committed
//!
//! A changed path is eligible when it matches the inclusion pattern as a
//! whole and no exclusion pattern matches it partially. Every pattern is
//! tried against several spellings of the path (absolute, repository
//! relative, and relative with a leading `/`) because upstream tools are not
//! consistent about which one they report.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::Config;
use crate::{Error, Result};

/// The spellings of one path that patterns are matched against
#[derive(Debug, Clone)]
pub struct PathForms {
    absolute: String,
    relative: Option<String>,
}

impl PathForms {
    /// Build the forms of `path` as seen from the repository `root`
    ///
    /// Relative paths are taken to be relative to `root`.
    pub fn new(path: &Path, root: &Path) -> Self {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        let relative = absolute
            .strip_prefix(root)
            .ok()
            .map(normalize)
            .filter(|p| !p.is_empty());

        Self {
            absolute: normalize(&absolute),
            relative,
        }
    }

    /// Forms checked for a whole-path match
    fn whole(&self) -> Vec<String> {
        let mut forms = vec![self.absolute.clone()];
        if let Some(ref rel) = self.relative {
            forms.push(rel.clone());
            forms.push(format!("/{}", rel));
        }
        forms
    }

    /// Forms checked for a partial match: the whole forms plus every leading
    /// directory of the absolute and relative paths
    fn partial(&self) -> Vec<String> {
        let mut forms = self.whole();
        for (idx, _) in self.absolute.match_indices('/').filter(|(i, _)| *i > 0) {
            forms.push(self.absolute[..idx].to_string());
        }
        if let Some(ref rel) = self.relative {
            for (idx, _) in rel.match_indices('/') {
                let prefix = &rel[..idx];
                forms.push(prefix.to_string());
                forms.push(format!("/{}", prefix));
            }
        }
        forms
    }
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A compiled set of glob patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    set: GlobSet,
    patterns: Vec<String>,
}

impl PatternSet {
    /// Compile `patterns`; `*` never crosses a `/`, `**` does
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut kept = Vec::with_capacity(patterns.len());

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .case_insensitive(!case_sensitive)
                .build()
                .map_err(|e| Error::Pattern {
                    pattern: pattern.to_string(),
                    reason: e.kind().to_string(),
                })?;
            builder.add(glob);
            kept.push(pattern.to_string());
        }

        let set = builder.build().map_err(|e| Error::Pattern {
            pattern: kept.join(", "),
            reason: e.to_string(),
        })?;

        Ok(Self {
            set,
            patterns: kept,
        })
    }

    /// The source patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether any pattern matches any form of the path
    ///
    /// With `partial`, a pattern also matches when it covers a leading
    /// directory of the path, so `drafts` or `**/drafts` veto
    /// `drafts/2024/todo.md`.
    pub fn matches(&self, path: &PathForms, partial: bool) -> bool {
        if self.is_empty() {
            return false;
        }

        let forms = if partial { path.partial() } else { path.whole() };
        forms.iter().any(|form| self.set.is_match(form))
    }
}

/// Check a single path against a list of patterns
pub fn matches<S: AsRef<str>>(
    path: &Path,
    root: &Path,
    patterns: &[S],
    case_sensitive: bool,
    partial: bool,
) -> Result<bool> {
    let set = PatternSet::new(patterns, case_sensitive)?;
    Ok(set.matches(&PathForms::new(path, root), partial))
}

/// Inclusion plus exclusion filter for changed paths
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: PatternSet,
    exclude: PatternSet,
}

impl FileFilter {
    /// Build a filter; inclusion matching is always case sensitive
    pub fn new<S: AsRef<str>>(include: &str, exclude: &[S], exclude_case_sensitive: bool) -> Result<Self> {
        Ok(Self {
            include: PatternSet::new(&[include], true)?,
            exclude: PatternSet::new(exclude, exclude_case_sensitive)?,
        })
    }

    /// Build the filter described by the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.file_pattern,
            &config.filter.exclude,
            config.filter.exclude_case,
        )
    }

    /// Whether the inclusion pattern covers the path
    pub fn is_included(&self, path: &Path, root: &Path) -> bool {
        self.include.matches(&PathForms::new(path, root), false)
    }

    /// Whether any exclusion pattern vetoes the path
    pub fn is_excluded(&self, path: &Path, root: &Path) -> bool {
        self.exclude.matches(&PathForms::new(path, root), true)
    }

    /// Included and not excluded
    pub fn is_eligible(&self, path: &Path, root: &Path) -> bool {
        let forms = PathForms::new(path, root);
        let eligible = self.include.matches(&forms, false) && !self.exclude.matches(&forms, true);
        tracing::trace!(path = %path.display(), eligible, "Checked path against filters");
        eligible
    }

    /// Keep only the eligible paths, preserving order
    pub fn select<'a, I>(&self, paths: I, root: &Path) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = &'a PathBuf>,
    {
        paths
            .into_iter()
            .filter(|p| self.is_eligible(p, root))
            .cloned()
            .collect()
    }
}
