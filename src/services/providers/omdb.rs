//! OMDb ratings provider
//!
//! Looks up IMDb and Rotten Tomatoes ratings, poster and runtime by IMDb id.
//! Missing keys and unknown titles produce empty ratings instead of errors.
use crate::{
    cache::{Cache, CacheKey},
    cached,
    config::Config,
    error::{AppError, AppResult},
    models::{OmdbRatings, OmdbResponse},
    services::providers::RatingsSource,
};
use reqwest::Client as HttpClient;

const RATINGS_CACHE_TTL: u64 = 86400; // 1 day

#[derive(Clone)]
pub struct OmdbClient {
    http_client: HttpClient,
    api_key: Option<String>,
    api_url: String,
    cache: Cache,
}

impl OmdbClient {
    pub fn new(cache: Cache, api_key: Option<String>, api_url: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        }
    }

    pub fn from_config(config: &Config, cache: Cache) -> Self {
        Self::new(
            cache,
            config.omdb_api_key.clone(),
            config.omdb_api_url.clone(),
        )
    }

    /// One lookup. A non-2xx status is an `ExternalApi` error and is never cached.
    async fn fetch(&self, api_key: &str, imdb_id: &str) -> AppResult<OmdbRatings> {
        let response = self
            .http_client
            .get(format!("{}/", self.api_url))
            .query(&[("apikey", api_key), ("i", imdb_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::ExternalApi(format!(
                "OMDb returned status {}",
                response.status()
            )));
        }

        let body: OmdbResponse = response.json().await?;
        Ok(OmdbRatings::from(body))
    }
}

#[async_trait::async_trait]
impl RatingsSource for OmdbClient {
    async fn ratings_by_imdb_id(&self, imdb_id: &str) -> AppResult<OmdbRatings> {
        let imdb_id = imdb_id.trim();
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(OmdbRatings::default());
        };
        if imdb_id.is_empty() {
            return Ok(OmdbRatings::default());
        }

        let result: AppResult<OmdbRatings> = cached!(
            self.cache,
            CacheKey::Ratings(imdb_id.to_string()),
            RATINGS_CACHE_TTL,
            async move {
                let ratings = self.fetch(api_key, imdb_id).await?;

                tracing::debug!(
                    imdb_id = %imdb_id,
                    imdb_rating = ?ratings.imdb_rating,
                    provider = "omdb",
                    "Ratings fetched"
                );

                Ok::<_, AppError>(ratings)
            }
        );

        match result {
            Err(AppError::ExternalApi(msg)) => {
                tracing::warn!(
                    imdb_id = %imdb_id,
                    error = %msg,
                    provider = "omdb",
                    "Ratings lookup failed, continuing without ratings"
                );
                Ok(OmdbRatings::default())
            }
            other => other,
        }
    }

    fn name(&self) -> &'static str {
        "omdb"
    }
}
