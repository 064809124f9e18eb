use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VigilError;

/// Top-level configuration loaded from `.vigil.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use vigil_core::VigilConfig;
///
/// let config = VigilConfig::default();
/// assert_eq!(config.review.max_steps_per_file, 10);
/// assert_eq!(config.review.max_total_steps, 50);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VigilConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Repository host settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
}

impl VigilConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Io`] if the file cannot be read, or
    /// [`VigilError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vigil_core::VigilConfig;
    /// use std::path::Path;
    ///
    /// let config = VigilConfig::from_file(Path::new(".vigil.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, VigilError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`VigilError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::VigilConfig;
    ///
    /// let toml = r#"
    /// [review]
    /// exclude_extensions = [".lock"]
    /// "#;
    /// let config = VigilConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.exclude_extensions, vec![".lock"]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, VigilError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

/// LLM provider configuration.
///
/// Any provider exposing an OpenAI-compatible `/v1/chat/completions`
/// endpoint works; `provider` only selects the default base URL and the
/// environment variable holding the API key.
///
/// # Examples
///
/// ```
/// use vigil_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o");
/// assert_eq!(config.api_key_env_var(), "OPENAI_API_KEY");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name (e.g. `"openai"`, `"openrouter"`, `"ollama"`).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for API requests.
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o".into()
}

fn default_timeout_secs() -> u64 {
    120
}

impl LlmConfig {
    /// Environment variable consulted when `api_key` is not set.
    pub fn api_key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openrouter" => "OPENROUTER_API_KEY",
            "gemini" => "GEMINI_API_KEY",
            "ollama" => "OLLAMA_API_KEY",
            _ => "OPENAI_API_KEY",
        }
    }

    /// Base URL to use, falling back to the provider's public endpoint.
    ///
    /// # Examples
    ///
    /// ```
    /// use vigil_core::LlmConfig;
    ///
    /// let config = LlmConfig {
    ///     provider: "ollama".into(),
    ///     ..LlmConfig::default()
    /// };
    /// assert_eq!(config.resolved_base_url(), "http://localhost:11434");
    /// ```
    pub fn resolved_base_url(&self) -> &str {
        if let Some(url) = self.base_url.as_deref() {
            return url.trim_end_matches('/');
        }
        match self.provider.as_str() {
            "openrouter" => "https://openrouter.ai/api",
            "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai",
            "ollama" => "http://localhost:11434",
            _ => "https://api.openai.com",
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Repository host configuration.
///
/// # Examples
///
/// ```
/// use vigil_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert_eq!(config.api_url, "https://api.github.com");
/// assert!(config.token.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Access token; `GITHUB_TOKEN` / `GH_TOKEN` are used when absent.
    pub token: Option<String>,
    /// REST API root, override for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use vigil_core::ReviewConfig;
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert_eq!(config.rate_limit_cooldown_secs, 10);
/// assert_eq!(config.cache_lock_timeout_ms, 5000);
/// assert!(config.dedupe_comments);
/// assert!(!config.fail_on_error);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Only review files with these extensions (`.rs`) or under these path
    /// prefixes (`src`). Empty means everything.
    #[serde(default)]
    pub include_extensions: Vec<String>,
    /// Never review files matching these extensions or prefixes.
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    /// Only review files under these path prefixes. Empty means everything.
    #[serde(default)]
    pub include_paths: Vec<String>,
    /// Never review files under these path prefixes.
    #[serde(default)]
    pub exclude_paths: Vec<String>,
    /// Maximum analysis steps per file (default: 10).
    #[serde(default = "default_max_steps_per_file")]
    pub max_steps_per_file: u32,
    /// Maximum analysis steps across the whole run (default: 50).
    #[serde(default = "default_max_total_steps")]
    pub max_total_steps: u32,
    /// Attempts for the whole review pipeline (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in milliseconds (default: 1000).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Extra wait after a rate-limit error in seconds (default: 10).
    #[serde(default = "default_rate_limit_cooldown_secs")]
    pub rate_limit_cooldown_secs: u64,
    /// Deadline for acquiring the content cache lock (default: 5000).
    #[serde(default = "default_cache_lock_timeout_ms")]
    pub cache_lock_timeout_ms: u64,
    /// Lines of surrounding context added to ranged content requests (default: 20).
    #[serde(default = "default_context_margin_lines")]
    pub context_margin_lines: u32,
    /// Offer fixes as one-click suggested changes when the model asks for it.
    #[serde(default = "default_true")]
    pub suggest_as_diff: bool,
    /// Skip re-posting a comment already posted earlier in the same run.
    #[serde(default = "default_true")]
    pub dedupe_comments: bool,
    /// Exit non-zero when the review fails instead of logging a warning.
    #[serde(default)]
    pub fail_on_error: bool,
}

fn default_max_steps_per_file() -> u32 {
    10
}

fn default_max_total_steps() -> u32 {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1000
}

fn default_rate_limit_cooldown_secs() -> u64 {
    10
}

fn default_cache_lock_timeout_ms() -> u64 {
    5000
}

fn default_context_margin_lines() -> u32 {
    20
}

fn default_true() -> bool {
    true
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
            max_steps_per_file: default_max_steps_per_file(),
            max_total_steps: default_max_total_steps(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            rate_limit_cooldown_secs: default_rate_limit_cooldown_secs(),
            cache_lock_timeout_ms: default_cache_lock_timeout_ms(),
            context_margin_lines: default_context_margin_lines(),
            suggest_as_diff: true,
            dedupe_comments: true,
            fail_on_error: false,
        }
    }
}
