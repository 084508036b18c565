use serde::Deserialize;
use std::env;
use std::path::PathBuf;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Reads a variable, treating an empty or whitespace-only value as unset.
fn env_nonempty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(var: &str, default: &str) -> String {
    env_nonempty(var).unwrap_or_else(|| default.to_string())
}

/// Parse a comma-separated list, dropping empty entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub chat: ChatConfig,
    pub upload: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Per-provider deadline.
    pub timeout_ms: u64,
    pub max_prompt_chars: usize,
    /// When false, an image alone is a valid request.
    pub require_prompt: bool,
    /// Provider name that gets the single retry on overload. `None` disables it.
    pub retry_provider: Option<String>,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub window_ms: u64,
    pub max_requests: u32,
}

/// Wire contract spoken by a provider endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions, also used by DeepSeek and OpenRouter.
    OpenAiChat,
    Gemini,
    Anthropic,
}

/// One configured provider, resolved from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Response key the front end reads, e.g. `chatgpt`.
    pub name: String,
    pub kind: ProviderKind,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Whether the model accepts image parts.
    pub vision: bool,
    pub extra_headers: Vec<(String, String)>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_prompt_chars: 10_000,
            require_prompt: false,
            retry_provider: Some("gemini".to_string()),
            retry_delay_ms: 1000,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            dir: env::temp_dir(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: 15 * 60 * 1000,
            max_requests: 60,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let chat_defaults = ChatConfig::default();
        let upload_defaults = UploadConfig::default();
        let rate_defaults = RateLimitConfig::default();

        Self {
            server: ServerConfig {
                host: env_or("CHORUS_HOST", "0.0.0.0"),
                port: parse_env_or("CHORUS_PORT", 3000),
                environment: parse_env_or("CHORUS_ENV", Environment::Development),
                allowed_origins: parse_list(&env_or("ALLOWED_ORIGINS", "http://localhost:5173")),
            },
            chat: ChatConfig {
                timeout_ms: parse_env_or("PROVIDER_TIMEOUT_MS", chat_defaults.timeout_ms),
                max_prompt_chars: parse_env_or("PROMPT_MAX_CHARS", chat_defaults.max_prompt_chars),
                require_prompt: parse_env_or("REQUIRE_PROMPT", chat_defaults.require_prompt),
                retry_provider: match env_nonempty("RETRY_PROVIDER") {
                    Some(name) if name.eq_ignore_ascii_case("none") => None,
                    Some(name) => Some(name.to_lowercase()),
                    None => chat_defaults.retry_provider,
                },
                retry_delay_ms: parse_env_or("RETRY_DELAY_MS", chat_defaults.retry_delay_ms),
            },
            upload: UploadConfig {
                max_bytes: parse_env_or("UPLOAD_MAX_BYTES", upload_defaults.max_bytes),
                dir: env_nonempty("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(upload_defaults.dir),
            },
            rate_limit: RateLimitConfig {
                window_ms: parse_env_or("RATE_LIMIT_WINDOW_MS", rate_defaults.window_ms),
                max_requests: parse_env_or("RATE_LIMIT_MAX", rate_defaults.max_requests),
            },
            providers: providers_from_env(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn is_production(&self) -> bool {
        self.server.environment.is_production()
    }
}

/// Resolve the provider set. A provider without an API key is left out.
///
/// With `OPENROUTER_API_KEY` set, chatgpt, gemini and claude all go through
/// OpenRouter's OpenAI-compatible endpoint instead of their native APIs.
fn providers_from_env() -> Vec<ProviderConfig> {
    let mut providers = match env_nonempty("OPENROUTER_API_KEY") {
        Some(api_key) => openrouter_providers(&api_key),
        None => native_providers(),
    };

    if let Some(api_key) = env_nonempty("DEEPSEEK_API_KEY") {
        providers.push(ProviderConfig {
            name: "deepseek".to_string(),
            kind: ProviderKind::OpenAiChat,
            api_key,
            base_url: env_or("DEEPSEEK_BASE_URL", DEEPSEEK_BASE_URL),
            model: env_or("DEEPSEEK_MODEL", "deepseek-chat"),
            max_tokens: parse_env_or("DEEPSEEK_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            vision: false,
            extra_headers: Vec::new(),
        });
    }

    providers
}

fn native_providers() -> Vec<ProviderConfig> {
    let mut providers = Vec::new();

    if let Some(api_key) = env_nonempty("OPENAI_API_KEY") {
        providers.push(ProviderConfig {
            name: "chatgpt".to_string(),
            kind: ProviderKind::OpenAiChat,
            api_key,
            base_url: env_or("OPENAI_BASE_URL", OPENAI_BASE_URL),
            model: env_or("OPENAI_MODEL", "gpt-4o"),
            max_tokens: parse_env_or("OPENAI_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            vision: true,
            extra_headers: Vec::new(),
        });
    }

    if let Some(api_key) = env_nonempty("GEMINI_API_KEY") {
        providers.push(ProviderConfig {
            name: "gemini".to_string(),
            kind: ProviderKind::Gemini,
            api_key,
            base_url: env_or("GEMINI_BASE_URL", GEMINI_BASE_URL),
            model: env_or("GEMINI_MODEL", "gemini-1.5-flash"),
            max_tokens: parse_env_or("GEMINI_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            vision: true,
            extra_headers: Vec::new(),
        });
    }

    if let Some(api_key) = env_nonempty("ANTHROPIC_API_KEY") {
        providers.push(ProviderConfig {
            name: "claude".to_string(),
            kind: ProviderKind::Anthropic,
            api_key,
            base_url: env_or("ANTHROPIC_BASE_URL", ANTHROPIC_BASE_URL),
            model: env_or("ANTHROPIC_MODEL", "claude-3-5-sonnet-20240620"),
            max_tokens: parse_env_or("ANTHROPIC_MAX_TOKENS", DEFAULT_MAX_TOKENS),
            vision: true,
            extra_headers: Vec::new(),
        });
    }

    providers
}

fn openrouter_providers(api_key: &str) -> Vec<ProviderConfig> {
    let base_url = env_or("OPENROUTER_BASE_URL", OPENROUTER_BASE_URL);

    let mut extra_headers = Vec::new();
    if let Some(site_url) = env_nonempty("OPENROUTER_SITE_URL") {
        extra_headers.push(("HTTP-Referer".to_string(), site_url));
    }
    if let Some(app_name) = env_nonempty("OPENROUTER_APP_NAME") {
        extra_headers.push(("X-Title".to_string(), app_name));
    }

    [
        ("chatgpt", "OPENROUTER_MODEL_CHATGPT", "openai/gpt-4o", "OPENAI_MAX_TOKENS"),
        ("gemini", "OPENROUTER_MODEL_GEMINI", "google/gemini-1.5-flash", "GEMINI_MAX_TOKENS"),
        ("claude", "OPENROUTER_MODEL_CLAUDE", "anthropic/claude-3.5-sonnet", "ANTHROPIC_MAX_TOKENS"),
    ]
    .into_iter()
    .map(|(name, model_var, default_model, tokens_var)| ProviderConfig {
        name: name.to_string(),
        kind: ProviderKind::OpenAiChat,
        api_key: api_key.to_string(),
        base_url: base_url.clone(),
        model: env_or(model_var, default_model),
        max_tokens: parse_env_or(tokens_var, DEFAULT_MAX_TOKENS),
        vision: true,
        extra_headers: extra_headers.clone(),
    })
    .collect()
}
