//! Problem markers used to gate commits

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::{Config, SettingsStore};
use crate::{Error, Result};

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Hint,
    Information,
    Warning,
    Error,
}

/// A single problem reported for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }
}

/// Diagnostics keyed by absolute path
pub type DiagnosticMap = HashMap<PathBuf, Vec<Diagnostic>>;

/// Source of per-file diagnostics
#[async_trait]
pub trait DiagnosticsProvider: Send + Sync {
    /// Diagnostics for exactly `paths`; paths without problems may be absent
    async fn diagnostics(&self, paths: &[PathBuf]) -> Result<DiagnosticMap>;
}

/// Provider that never reports anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDiagnostics;

#[async_trait]
impl DiagnosticsProvider for NoDiagnostics {
    async fn diagnostics(&self, _paths: &[PathBuf]) -> Result<DiagnosticMap> {
        Ok(DiagnosticMap::new())
    }
}

/// Runs a checker command and parses compiler-style output
///
/// Each line of the form `path:line[:col]: error|warning: message` becomes
/// a diagnostic. Relative paths resolve against the repository root. The
/// command's exit status is ignored since most checkers exit non-zero when
/// they find problems.
#[derive(Debug, Clone)]
pub struct CommandDiagnostics {
    command: String,
    root: PathBuf,
}

impl CommandDiagnostics {
    pub fn new(command: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            root: root.into(),
        }
    }
}

#[async_trait]
impl DiagnosticsProvider for CommandDiagnostics {
    async fn diagnostics(&self, paths: &[PathBuf]) -> Result<DiagnosticMap> {
        tracing::debug!(command = %self.command, files = paths.len(), "Running diagnostics command");

        let output = shell(&self.command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::Diagnostics(format!("Failed to run '{}': {}", self.command, e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        let mut map = DiagnosticMap::new();
        for (path, diagnostic) in text.lines().filter_map(|l| parse_line(l, &self.root)) {
            if paths.contains(&path) {
                map.entry(path).or_default().push(diagnostic);
            }
        }
        Ok(map)
    }
}

/// Provider for the configured checker command, if any
pub fn provider_from_config(config: &Config, root: &Path) -> Arc<dyn DiagnosticsProvider> {
    match config.diagnostics.command.as_deref().map(str::trim) {
        Some(command) if !command.is_empty() => Arc::new(CommandDiagnostics::new(command, root)),
        _ => Arc::new(NoDiagnostics),
    }
}

/// Provider that follows `diagnostics.command` as the settings change
///
/// The command is looked up on every query, so editing it takes effect on
/// the next commit without restarting the watch session.
#[derive(Debug)]
pub struct ConfiguredDiagnostics {
    settings: Arc<SettingsStore>,
    root: PathBuf,
}

impl ConfiguredDiagnostics {
    pub fn new(settings: Arc<SettingsStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            settings,
            root: root.into(),
        }
    }
}

#[async_trait]
impl DiagnosticsProvider for ConfiguredDiagnostics {
    async fn diagnostics(&self, paths: &[PathBuf]) -> Result<DiagnosticMap> {
        let config = self.settings.snapshot()?;
        provider_from_config(&config, &self.root)
            .diagnostics(paths)
            .await
    }
}

#[cfg(unix)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

/// Parse one `path:line[:col]: severity: message` line
fn parse_line(line: &str, root: &Path) -> Option<(PathBuf, Diagnostic)> {
    let (severity, idx, len) = [
        (Severity::Error, ": error: "),
        (Severity::Warning, ": warning: "),
    ]
    .into_iter()
    .filter_map(|(sev, needle)| line.find(needle).map(|idx| (sev, idx, needle.len())))
    .min_by_key(|&(_, idx, _)| idx)?;

    let message = line[idx + len..].trim();

    // Strip `:line` and an optional `:col`
    let mut location = &line[..idx];
    let mut numeric = 0;
    while numeric < 2 {
        match location.rsplit_once(':') {
            Some((head, tail)) if is_number(tail) => {
                location = head;
                numeric += 1;
            }
            _ => break,
        }
    }
    if numeric == 0 || location.trim().is_empty() {
        return None;
    }

    Some((resolve(location, root), Diagnostic::new(severity, message)))
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn resolve(path: &str, root: &Path) -> PathBuf {
    let path = Path::new(path.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Whether any diagnostic reaches `threshold`
pub fn has_blocking(map: &DiagnosticMap, threshold: Severity) -> bool {
    map.values().flatten().any(|d| d.severity >= threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/work/notes")
    }

    #[test]
    fn test_parse_line_with_column() {
        let (path, diag) = parse_line("src/main.rs:10:5: error: expected `;`", &root()).unwrap();
        assert_eq!(path, PathBuf::from("/work/notes/src/main.rs"));
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "expected `;`");
    }

    #[test]
    fn test_parse_line_without_column() {
        let (path, diag) = parse_line("/abs/doc.md:3: warning: long line", &root()).unwrap();
        assert_eq!(path, PathBuf::from("/abs/doc.md"));
        assert_eq!(diag.severity, Severity::Warning);
    }

    #[test]
    fn test_parse_line_ignores_noise() {
        assert!(parse_line("Checking 3 files...", &root()).is_none());
        assert!(parse_line("doc.md: error: no line number", &root()).is_none());
    }

    #[test]
    fn test_has_blocking_threshold() {
        let mut map = DiagnosticMap::new();
        map.insert(
            root().join("a.md"),
            vec![Diagnostic::new(Severity::Warning, "w")],
        );
        assert!(!has_blocking(&map, Severity::Error));
        assert!(has_blocking(&map, Severity::Warning));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_diagnostics_filters_requested_paths() {
        let temp = tempfile::TempDir::new().unwrap();
        let provider = CommandDiagnostics::new(
            "echo 'a.md:1:1: error: broken'; echo 'b.md:2: warning: meh'",
            temp.path(),
        );

        let requested = vec![temp.path().join("a.md")];
        let map = provider.diagnostics(&requested).await.unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map[&requested[0]][0].message, "broken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_configured_diagnostics_picks_up_command_changes() {
        let temp = tempfile::TempDir::new().unwrap();
        let settings_file = temp.path().join("gitdoc.toml");
        std::fs::write(&settings_file, "[diagnostics]\n").unwrap();
        let settings = Arc::new(SettingsStore::with_files(None, settings_file.clone()));
        let provider = ConfiguredDiagnostics::new(settings, temp.path());
        let requested = vec![temp.path().join("a.md")];

        assert!(provider.diagnostics(&requested).await.unwrap().is_empty());

        std::fs::write(
            &settings_file,
            "[diagnostics]\ncommand = \"echo 'a.md:4: error: dangling link'\"\n",
        )
        .unwrap();
        let map = provider.diagnostics(&requested).await.unwrap();
        assert_eq!(map[&requested[0]][0].message, "dangling link");
    }
}
