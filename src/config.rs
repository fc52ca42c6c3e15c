use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Set to false to run without Redis (every lookup goes to the remote APIs)
    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// TMDB read access token (sent as a bearer token)
    pub tmdb_api_key: String,

    /// TMDB API base URL
    #[serde(default = "default_tmdb_api_url")]
    pub tmdb_api_url: String,

    /// TMDB image CDN base URL
    #[serde(default = "default_tmdb_image_url")]
    pub tmdb_image_url: String,

    /// OMDb API key. Ratings are left empty when missing.
    #[serde(default)]
    pub omdb_api_key: Option<String>,

    /// OMDb API base URL
    #[serde(default = "default_omdb_api_url")]
    pub omdb_api_url: String,

    /// Anthropic API key. Without it recommendations use catalog search only.
    #[serde(default)]
    pub anthropic_api_key: Option<String>,

    /// Anthropic API base URL
    #[serde(default = "default_anthropic_api_url")]
    pub anthropic_api_url: String,

    /// Model used for recommendations and search examples
    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    /// Region used for watch providers, discovery and age ratings
    #[serde(default = "default_watch_region")]
    pub watch_region: String,

    /// Language requested from the catalog
    #[serde(default = "default_catalog_language")]
    pub catalog_language: String,

    /// Provider ids used when the client selects none
    #[serde(default = "default_providers")]
    pub default_providers: Vec<u32>,

    /// Number of suggestions enriched in parallel
    #[serde(default = "default_batch_size")]
    pub recommendation_batch_size: usize,

    /// Attempts made for each watch provider lookup
    #[serde(default = "default_provider_fetch_attempts")]
    pub provider_fetch_attempts: u32,

    /// Base delay between watch provider attempts, in milliseconds
    #[serde(default = "default_provider_retry_delay_ms")]
    pub provider_retry_delay_ms: u64,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_tmdb_api_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_url() -> String {
    "https://image.tmdb.org/t/p".to_string()
}

fn default_omdb_api_url() -> String {
    "https://www.omdbapi.com".to_string()
}

fn default_anthropic_api_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_llm_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_watch_region() -> String {
    "GB".to_string()
}

fn default_catalog_language() -> String {
    "en-GB".to_string()
}

// Amazon Prime Video, Netflix, BBC iPlayer, Disney Plus
fn default_providers() -> Vec<u32> {
    vec![9, 8, 188, 337]
}

fn default_batch_size() -> usize {
    5
}

fn default_provider_fetch_attempts() -> u32 {
    3
}

fn default_provider_retry_delay_ms() -> u64 {
    500
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Load configuration from an explicit set of variables
    pub fn from_iter<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Config>(vars)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        if config.recommendation_batch_size == 0 {
            anyhow::bail!("RECOMMENDATION_BATCH_SIZE must be at least 1");
        }

        Ok(config)
    }

    /// Anthropic key, ignoring blank values
    pub fn anthropic_key(&self) -> Option<&str> {
        self.anthropic_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Address the server binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
