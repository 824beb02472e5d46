//! Configuration management for GitDoc
//!
//! Configuration is resolved with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (GITDOC_*)
//! 3. Workspace file (`<git-dir>/gitdoc.toml`)
//! 4. Global file (`~/.config/gitdoc/config.toml`)
//! 5. Default values
//!
//! The workspace file lives inside the git directory so that writing a
//! setting never shows up as a change to auto-commit.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// Name of the per-repository settings file inside the git directory
pub const WORKSPACE_CONFIG_FILE: &str = "gitdoc.toml";

/// When to push after committing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoPush {
    Off,
    /// Push right after every successful commit
    #[default]
    #[serde(alias = "onCommit")]
    OnCommit,
    /// Push on a fixed interval
    #[serde(alias = "afterDelay")]
    AfterDelay,
}

/// When to pull remote changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoPull {
    Off,
    /// Pull right after every successful commit
    #[serde(alias = "onCommit")]
    OnCommit,
    /// Pull before every push
    #[default]
    #[serde(alias = "onPush")]
    OnPush,
    /// Pull on a fixed interval
    #[serde(alias = "afterDelay")]
    AfterDelay,
}

/// How pushes are sent to the remote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PushMode {
    Push,
    #[default]
    #[serde(alias = "forcePush")]
    ForcePush,
    #[serde(alias = "forcePushWithLease")]
    ForcePushWithLease,
}

/// Diagnostic severity that blocks a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationLevel {
    None,
    Warning,
    #[default]
    Error,
}

/// Which language model backend generates commit messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AiProviderKind {
    /// The Claude Code CLI
    #[default]
    Claude,
    /// A local Ollama server
    Ollama,
}

impl std::str::FromStr for AiProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Ok(Self::Claude),
            "ollama" => Ok(Self::Ollama),
            other => Err(Error::Config(format!("Unknown AI provider: {}", other))),
        }
    }
}

/// Exclusion filter configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Patterns that veto a changed path, matched partially
    pub exclude: Vec<String>,

    /// Whether exclusion patterns are case sensitive
    pub exclude_case: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            exclude_case: true,
        }
    }
}

/// AI commit message configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    /// Generate commit messages with a language model
    pub enabled: bool,

    /// Backend used to reach the model
    pub provider: AiProviderKind,

    /// Model family or name to select
    pub model: String,

    /// Ollama endpoint
    pub endpoint: String,

    /// Path to the claude executable
    pub claude_path: String,

    /// Extra instructions appended to the prompt
    pub custom_instructions: Option<String>,

    /// Ask the model to prepend an emoji
    pub use_emojis: bool,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: AiProviderKind::Claude,
            model: "sonnet".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            claude_path: "claude".to_string(),
            custom_instructions: None,
            use_emojis: false,
        }
    }
}

/// Commit validation configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Command printing `path:line:col: severity: message` lines
    pub command: Option<String>,
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Whether auto-commit is active for this workspace
    pub enabled: bool,

    /// Quiet period after the last change before committing
    #[serde(with = "humantime_serde")]
    pub auto_commit_delay: Duration,

    pub auto_push: AutoPush,

    #[serde(with = "humantime_serde")]
    pub auto_push_delay: Duration,

    pub auto_pull: AutoPull,

    #[serde(with = "humantime_serde")]
    pub auto_pull_delay: Duration,

    pub push_mode: PushMode,

    /// Inclusion glob, matched against the whole path
    pub file_pattern: String,

    /// Timestamp format for generated commit messages
    pub commit_message_format: String,

    pub commit_validation_level: ValidationLevel,

    /// Commit pending changes when the watcher shuts down
    pub commit_on_close: bool,

    /// Pull once when a watch session starts
    pub pull_on_open: bool,

    /// Skip commit hooks
    pub no_verify: bool,

    /// Zone used to render the commit message timestamp
    pub time_zone: Option<String>,

    /// Branches on which auto-commit never runs
    pub exclude_branches: Vec<String>,

    /// Log every orchestration step
    pub full_trace: bool,

    pub filter: FilterConfig,

    pub ai: AiConfig,

    pub diagnostics: DiagnosticsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_commit_delay: DEFAULT_DELAY,
            auto_push: AutoPush::default(),
            auto_push_delay: DEFAULT_DELAY,
            auto_pull: AutoPull::default(),
            auto_pull_delay: DEFAULT_DELAY,
            push_mode: PushMode::default(),
            file_pattern: "**/*".to_string(),
            commit_message_format: "ff".to_string(),
            commit_validation_level: ValidationLevel::default(),
            commit_on_close: true,
            pull_on_open: true,
            no_verify: false,
            time_zone: None,
            exclude_branches: Vec::new(),
            full_trace: false,
            filter: FilterConfig::default(),
            ai: AiConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

/// Overrides that sit above the config files
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub enabled: Option<bool>,
    pub auto_commit_delay: Option<Duration>,
    pub ai_provider: Option<AiProviderKind>,
    pub ai_model: Option<String>,
}

impl Config {
    /// Load configuration from the global file and an optional workspace file
    ///
    /// Missing files are skipped; keys in the workspace file win.
    pub fn load(global: Option<&Path>, workspace: Option<&Path>) -> Result<Self> {
        let mut merged = toml::Table::new();

        for path in [global, workspace].into_iter().flatten() {
            if path.exists() {
                merge_tables(&mut merged, read_table(path)?);
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default global config file path
    ///
    /// Returns `~/.config/gitdoc/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("gitdoc").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - GITDOC_ENABLED: `true`/`false`
    /// - GITDOC_AUTO_COMMIT_DELAY: duration such as `10s`
    /// - GITDOC_AI_PROVIDER: `claude` or `ollama`
    /// - GITDOC_AI_MODEL: model family
    pub fn with_env_overrides(self) -> Result<Self> {
        let mut overrides = ConfigOverrides::default();

        if let Ok(enabled) = std::env::var("GITDOC_ENABLED") {
            overrides.enabled = Some(matches!(
                enabled.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            ));
        }

        if let Ok(delay) = std::env::var("GITDOC_AUTO_COMMIT_DELAY") {
            let parsed = humantime_serde::re::humantime::parse_duration(&delay).map_err(|e| {
                Error::Config(format!("Invalid GITDOC_AUTO_COMMIT_DELAY '{}': {}", delay, e))
            })?;
            overrides.auto_commit_delay = Some(parsed);
        }

        if let Ok(provider) = std::env::var("GITDOC_AI_PROVIDER") {
            overrides.ai_provider = Some(provider.parse()?);
        }

        if let Ok(model) = std::env::var("GITDOC_AI_MODEL") {
            overrides.ai_model = Some(model);
        }

        Ok(self.with_overrides(&overrides))
    }

    /// Apply explicit overrides (CLI flags)
    pub fn with_overrides(mut self, overrides: &ConfigOverrides) -> Self {
        if let Some(enabled) = overrides.enabled {
            self.enabled = enabled;
        }

        if let Some(delay) = overrides.auto_commit_delay {
            self.auto_commit_delay = delay;
        }

        if let Some(provider) = overrides.ai_provider {
            self.ai.provider = provider;
        }

        if let Some(ref model) = overrides.ai_model {
            self.ai.model = model.clone();
        }

        self
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
    contents
        .parse::<toml::Table>()
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Recursively merge `overlay` into `base`, overlay keys winning
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

enum Backing {
    Files {
        global: Option<PathBuf>,
        workspace: PathBuf,
    },
    Memory(Mutex<Config>),
}

/// Settings collaborator: fresh snapshots for every decision, plus writes
/// for the handful of settings GitDoc changes on its own.
pub struct SettingsStore {
    backing: Backing,
    overrides: ConfigOverrides,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("SettingsStore");
        if let Backing::Files { global, workspace } = &self.backing {
            s.field("global", global).field("workspace", workspace);
        }
        s.field("overrides", &self.overrides).finish_non_exhaustive()
    }
}

impl SettingsStore {
    /// Settings for the repository whose git directory is `git_dir`
    pub fn for_repository(git_dir: &Path, overrides: ConfigOverrides) -> Self {
        Self {
            backing: Backing::Files {
                global: Config::default_config_path(),
                workspace: git_dir.join(WORKSPACE_CONFIG_FILE),
            },
            overrides,
        }
    }

    /// Settings backed by explicit files
    pub fn with_files(global: Option<PathBuf>, workspace: PathBuf) -> Self {
        Self {
            backing: Backing::Files { global, workspace },
            overrides: ConfigOverrides::default(),
        }
    }

    /// Settings held in memory only
    pub fn in_memory(config: Config) -> Self {
        Self {
            backing: Backing::Memory(Mutex::new(config)),
            overrides: ConfigOverrides::default(),
        }
    }

    /// Path of the workspace settings file, if file backed
    pub fn workspace_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Files { workspace, .. } => Some(workspace),
            Backing::Memory(_) => None,
        }
    }

    /// Path of the global settings file, if any
    pub fn global_path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Files { global, .. } => global.as_deref(),
            Backing::Memory(_) => None,
        }
    }

    /// Read the current settings
    pub fn snapshot(&self) -> Result<Config> {
        match &self.backing {
            Backing::Files { global, workspace } => {
                Ok(Config::load(global.as_deref(), Some(workspace))?
                    .with_env_overrides()?
                    .with_overrides(&self.overrides))
            }
            Backing::Memory(config) => Ok(lock(config)?.clone().with_overrides(&self.overrides)),
        }
    }

    /// Persist the enabled flag
    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        tracing::info!(enabled, "Updating enabled setting");
        self.write(&["enabled"], toml::Value::Boolean(enabled), |c| c.enabled = enabled)
    }

    /// Persist the AI enabled flag
    pub fn set_ai_enabled(&self, enabled: bool) -> Result<()> {
        tracing::info!(enabled, "Updating AI enabled setting");
        self.write(&["ai", "enabled"], toml::Value::Boolean(enabled), |c| {
            c.ai.enabled = enabled
        })
    }

    /// Persist the selected AI model
    pub fn set_ai_model(&self, model: &str) -> Result<()> {
        tracing::info!(model, "Updating AI model setting");
        self.write(&["ai", "model"], toml::Value::String(model.to_string()), |c| {
            c.ai.model = model.to_string()
        })
    }

    fn write(
        &self,
        key: &[&str],
        value: toml::Value,
        apply: impl FnOnce(&mut Config),
    ) -> Result<()> {
        match &self.backing {
            Backing::Files { workspace, .. } => write_key(workspace, key, value),
            Backing::Memory(config) => {
                apply(&mut *lock(config)?);
                Ok(())
            }
        }
    }
}

fn lock(config: &Mutex<Config>) -> Result<std::sync::MutexGuard<'_, Config>> {
    config
        .lock()
        .map_err(|_| Error::Other("Settings lock poisoned".to_string()))
}

/// Set `key` (a dotted path) in the TOML file at `path`, creating it if needed
fn write_key(path: &Path, key: &[&str], value: toml::Value) -> Result<()> {
    let mut root = if path.exists() {
        read_table(path)?
    } else {
        toml::Table::new()
    };

    let Some((last, parents)) = key.split_last() else {
        return Err(Error::Config("Empty settings key".to_string()));
    };

    let mut table = &mut root;
    for part in parents {
        let entry = table
            .entry(part.to_string())
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        table = match entry {
            toml::Value::Table(t) => t,
            _ => {
                return Err(Error::Config(format!(
                    "Setting '{}' is not a table in {}",
                    part,
                    path.display()
                )))
            }
        };
    }
    table.insert(last.to_string(), value);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(&root)
        .map_err(|e| Error::Other(format!("Failed to serialize settings: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}
