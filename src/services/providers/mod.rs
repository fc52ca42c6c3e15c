//! External data providers
//!
//! Each remote API the recommendation pipeline talks to sits behind a trait, so
//! the pipeline can be driven by fakes in tests and the concrete HTTP clients
//! stay small.

use crate::{
    error::AppResult,
    models::{
        OmdbRatings, TmdbCredits, TmdbExternalIds, TmdbMovie, TmdbMovieDetails,
        TmdbRegionProviders, TmdbVideo,
    },
};

pub mod anthropic;
pub mod omdb;
pub mod tmdb;

pub use anthropic::AnthropicClient;
pub use omdb::OmdbClient;
pub use tmdb::TmdbClient;

/// Film catalog: search, discovery and per-movie metadata
///
/// Region and language are fixed per client instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MovieCatalog: Send + Sync {
    /// Search movies by free text. A blank query returns no results.
    async fn search_movies(&self, query: &str) -> AppResult<Vec<TmdbMovie>>;

    /// Popular movies streaming on any of `provider_ids` in the region
    async fn discover_by_providers(&self, provider_ids: &[u32]) -> AppResult<Vec<TmdbMovie>>;

    async fn movie_videos(&self, movie_id: u64) -> AppResult<Vec<TmdbVideo>>;

    async fn external_ids(&self, movie_id: u64) -> AppResult<TmdbExternalIds>;

    async fn credits(&self, movie_id: u64) -> AppResult<TmdbCredits>;

    async fn movie_details(&self, movie_id: u64) -> AppResult<TmdbMovieDetails>;

    /// Age certification published for the region, if any
    async fn release_certification(&self, movie_id: u64) -> AppResult<Option<String>>;

    /// Where the movie streams in the region; `None` when the region has no entry
    async fn watch_providers(&self, movie_id: u64) -> AppResult<Option<TmdbRegionProviders>>;

    /// Full poster URL for a catalog image path
    fn image_url(&self, path: &str) -> String;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Ratings lookup keyed by IMDb id
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RatingsSource: Send + Sync {
    /// Ratings for a title. Unknown titles yield empty ratings, not an error.
    async fn ratings_by_imdb_id(&self, imdb_id: &str) -> AppResult<OmdbRatings>;

    fn name(&self) -> &'static str;
}

/// Text completion from a hosted language model
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Completes `prompt` under `system` and returns the reply text
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> AppResult<String>;

    fn name(&self) -> &'static str;
}
