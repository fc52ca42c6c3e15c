//! TMDB (The Movie Database) catalog provider
//!
//! Uses a v4 read access token as bearer auth. Every call is scoped to the
//! region and language the client was built with.
use crate::{
    cache::{Cache, CacheKey},
    cached,
    config::Config,
    error::{AppError, AppResult},
    models::{
        TmdbCredits, TmdbExternalIds, TmdbMovie, TmdbMovieDetails, TmdbPage, TmdbRegionProviders,
        TmdbReleaseDates, TmdbVideo, TmdbWatchProvidersResponse,
    },
    services::providers::MovieCatalog,
};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use tracing::instrument;

const SEARCH_CACHE_TTL: u64 = 3600; // 1 hour
const METADATA_CACHE_TTL: u64 = 604800; // 1 week
const CERTIFICATION_CACHE_TTL: u64 = 86400; // 1 day
const POSTER_SIZE: &str = "w342";
const CAST_LIMIT: usize = 4;

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    image_url: String,
    region: String,
    language: String,
    cache: Cache,
}

impl TmdbClient {
    pub fn new(
        cache: Cache,
        api_key: String,
        api_url: String,
        image_url: String,
        region: String,
        language: String,
    ) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            image_url: image_url.trim_end_matches('/').to_string(),
            region,
            language,
            cache,
        }
    }

    pub fn from_config(config: &Config, cache: Cache) -> Self {
        Self::new(
            cache,
            config.tmdb_api_key.clone(),
            config.tmdb_api_url.clone(),
            config.tmdb_image_url.clone(),
            config.watch_region.clone(),
            config.catalog_language.clone(),
        )
    }

    /// GET `path` with `params` and decode the JSON body
    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);
        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB returned status {} for {}: {}",
                status, path, body
            )));
        }

        Ok(response.json().await?)
    }

    fn language_param(&self) -> (&'static str, String) {
        ("language", self.language.clone())
    }
}

#[async_trait::async_trait]
impl MovieCatalog for TmdbClient {
    #[instrument(skip(self), fields(provider = "tmdb"))]
    async fn search_movies(&self, query: &str) -> AppResult<Vec<TmdbMovie>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        cached!(
            self.cache,
            CacheKey::MovieSearch(query.to_string()),
            SEARCH_CACHE_TTL,
            async move {
                let page: TmdbPage<TmdbMovie> = self
                    .get(
                        "/search/movie",
                        &[
                            ("query", query.to_string()),
                            ("include_adult", "false".to_string()),
                            self.language_param(),
                            ("page", "1".to_string()),
                        ],
                    )
                    .await?;

                tracing::info!(
                    query = %query,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Movie search completed"
                );

                Ok::<_, AppError>(page.results)
            }
        )
    }

    #[instrument(skip(self), fields(provider = "tmdb"))]
    async fn discover_by_providers(&self, provider_ids: &[u32]) -> AppResult<Vec<TmdbMovie>> {
        cached!(
            self.cache,
            CacheKey::Discover {
                region: self.region.clone(),
                providers: provider_ids.to_vec(),
            },
            SEARCH_CACHE_TTL,
            async move {
                let mut params = vec![
                    ("include_adult", "false".to_string()),
                    self.language_param(),
                    ("sort_by", "popularity.desc".to_string()),
                    ("watch_region", self.region.clone()),
                    ("page", "1".to_string()),
                ];

                if !provider_ids.is_empty() {
                    // Pipe-separated ids mean "on any of these services"; commas would require all of them
                    let ids: Vec<String> = provider_ids.iter().map(u32::to_string).collect();
                    params.push(("with_watch_providers", ids.join("|")));
                }

                let page: TmdbPage<TmdbMovie> = self.get("/discover/movie", &params).await?;

                tracing::info!(
                    providers = ?provider_ids,
                    results = page.results.len(),
                    provider = "tmdb",
                    "Discover completed"
                );

                Ok::<_, AppError>(page.results)
            }
        )
    }

    async fn movie_videos(&self, movie_id: u64) -> AppResult<Vec<TmdbVideo>> {
        cached!(
            self.cache,
            CacheKey::MovieVideos(movie_id),
            METADATA_CACHE_TTL,
            async move {
                let page: TmdbPage<TmdbVideo> = self
                    .get(
                        &format!("/movie/{}/videos", movie_id),
                        &[self.language_param()],
                    )
                    .await?;
                Ok::<_, AppError>(page.results)
            }
        )
    }

    async fn external_ids(&self, movie_id: u64) -> AppResult<TmdbExternalIds> {
        cached!(
            self.cache,
            CacheKey::ExternalIds(movie_id),
            METADATA_CACHE_TTL,
            self.get::<TmdbExternalIds>(&format!("/movie/{}/external_ids", movie_id), &[])
        )
    }

    async fn credits(&self, movie_id: u64) -> AppResult<TmdbCredits> {
        cached!(
            self.cache,
            CacheKey::MovieCredits(movie_id),
            METADATA_CACHE_TTL,
            async move {
                let mut credits: TmdbCredits = self
                    .get(&format!("/movie/{}/credits", movie_id), &[])
                    .await?;
                credits.cast.truncate(CAST_LIMIT);
                Ok::<_, AppError>(credits)
            }
        )
    }

    async fn movie_details(&self, movie_id: u64) -> AppResult<TmdbMovieDetails> {
        cached!(
            self.cache,
            CacheKey::MovieDetails(movie_id),
            METADATA_CACHE_TTL,
            self.get::<TmdbMovieDetails>(&format!("/movie/{}", movie_id), &[self.language_param()])
        )
    }

    async fn release_certification(&self, movie_id: u64) -> AppResult<Option<String>> {
        cached!(
            self.cache,
            CacheKey::Certification {
                movie_id,
                region: self.region.clone(),
            },
            CERTIFICATION_CACHE_TTL,
            async move {
                let dates: TmdbReleaseDates = self
                    .get(&format!("/movie/{}/release_dates", movie_id), &[])
                    .await?;
                Ok::<_, AppError>(dates.certification_for(&self.region))
            }
        )
    }

    #[instrument(skip(self), fields(provider = "tmdb"))]
    async fn watch_providers(&self, movie_id: u64) -> AppResult<Option<TmdbRegionProviders>> {
        let mut response: TmdbWatchProvidersResponse = self
            .get(&format!("/movie/{}/watch/providers", movie_id), &[])
            .await?;

        Ok(response.results.remove(&self.region))
    }

    fn image_url(&self, path: &str) -> String {
        format!("{}/{}{}", self.image_url, POSTER_SIZE, path)
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
