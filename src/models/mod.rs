use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

pub mod streaming_service;

pub use streaming_service::{provider_name, provider_names, KnownProvider, KNOWN_PROVIDERS};

static RUNTIME_MINUTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+").expect("runtime minutes pattern should compile"));

/// TMDB genre id for documentaries
pub const DOCUMENTARY_GENRE_ID: u32 = 99;

/// Request body of the recommendation endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    #[serde(default)]
    pub query: Option<String>,
    /// TMDB provider ids the user subscribes to
    #[serde(default)]
    pub streaming_services: Option<Vec<u32>>,
}

/// A streaming service carrying a title in the configured region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WatchProvider {
    pub id: u32,
    pub name: String,
    pub logo_path: Option<String>,
}

/// A catalog-matched movie enriched with ratings and providers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: u64,
    pub title: String,
    pub overview: String,
    pub poster_url: Option<String>,
    pub release_year: Option<String>,
    pub runtime: Option<u32>,
    pub imdb_rating: Option<String>,
    pub rotten_tomatoes_rating: Option<String>,
    pub trailer_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<String>,
    pub age_rating: Option<String>,
    pub providers: Vec<WatchProvider>,
}

/// External search pages for a title the catalog could not resolve
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchLinks {
    pub imdb: String,
    pub letterboxd: String,
    pub google: String,
}

/// An AI-suggested title that could not be resolved in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedRecommendation {
    pub title: String,
    pub year: Option<i32>,
    pub reason: String,
    pub search_links: SearchLinks,
}

/// Recommendations split into display tiers
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    /// Films available on at least one selected service
    pub recommendations: Vec<Recommendation>,
    /// Films only available elsewhere, or nowhere
    pub other_services: Vec<Recommendation>,
    pub unmatched: Vec<UnmatchedRecommendation>,
}

/// One title suggested by the language model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSuggestion {
    pub title: String,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reason: String,
}

/// Accepts a string or null
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `2020`, `"2020"` or null
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Example search phrases offered to the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchExamples {
    #[serde(default)]
    pub director: String,
    #[serde(default)]
    pub actor: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub rating_filter: String,
    #[serde(default)]
    pub runtime_filter: String,
}

impl SearchExamples {
    pub fn is_complete(&self) -> bool {
        [
            &self.director,
            &self.actor,
            &self.genre,
            &self.theme,
            &self.rating_filter,
            &self.runtime_filter,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

impl Default for SearchExamples {
    fn default() -> Self {
        Self {
            director: "Akira Kurosawa".to_string(),
            actor: "Tilda Swinton".to_string(),
            genre: "slow cinema".to_string(),
            theme: "existentialism".to_string(),
            rating_filter: "rating over 7 on IMDB".to_string(),
            runtime_filter: "running time less than 2 hours".to_string(),
        }
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Paged result wrapper used by search and discover
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
}

/// Movie as returned by search and discover
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbMovie {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
}

impl TmdbMovie {
    /// Display title, falling back to `name` and then to an empty string
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.name.as_deref())
            .unwrap_or("")
    }

    pub fn release_year(&self) -> Option<i32> {
        self.release_date.as_deref().and_then(parse_release_year)
    }
}

/// Year of a TMDB `YYYY-MM-DD` date; a bare leading year is accepted too
pub fn parse_release_year(date: &str) -> Option<i32> {
    let date = date.trim();
    if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        return Some(parsed.year());
    }
    date.get(..4).and_then(|y| y.parse().ok())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbGenre {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Response of `GET /movie/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbMovieDetails {
    pub id: u64,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub runtime: Option<u32>,
}

impl TmdbMovieDetails {
    pub fn is_documentary(&self) -> bool {
        self.genres.iter().any(|g| g.id == DOCUMENTARY_GENRE_ID)
    }

    /// Runtime in minutes; TMDB reports 0 when unknown
    pub fn known_runtime(&self) -> Option<u32> {
        self.runtime.filter(|&r| r > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbVideo {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TmdbExternalIds {
    #[serde(default)]
    pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbCastMember {
    pub name: String,
    #[serde(default)]
    pub character: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbCrewMember {
    pub name: String,
    #[serde(default)]
    pub job: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TmdbCredits {
    #[serde(default)]
    pub cast: Vec<TmdbCastMember>,
    #[serde(default)]
    pub crew: Vec<TmdbCrewMember>,
}

impl TmdbCredits {
    pub fn director(&self) -> Option<&str> {
        self.crew
            .iter()
            .find(|person| person.job == "Director")
            .map(|person| person.name.as_str())
    }

    pub fn top_actors(&self, count: usize) -> Vec<String> {
        self.cast
            .iter()
            .take(count)
            .map(|person| person.name.clone())
            .collect()
    }
}

/// Response of `GET /movie/{id}/release_dates`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReleaseDates {
    #[serde(default)]
    pub results: Vec<TmdbRegionReleases>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbRegionReleases {
    pub iso_3166_1: String,
    #[serde(default)]
    pub release_dates: Vec<TmdbReleaseDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TmdbReleaseDate {
    #[serde(default)]
    pub certification: String,
}

impl TmdbReleaseDates {
    /// First non-empty certification published for `region`
    pub fn certification_for(&self, region: &str) -> Option<String> {
        self.results
            .iter()
            .find(|r| r.iso_3166_1.eq_ignore_ascii_case(region))?
            .release_dates
            .iter()
            .map(|d| d.certification.trim())
            .find(|c| !c.is_empty())
            .map(str::to_string)
    }
}

/// Response of `GET /movie/{id}/watch/providers`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbWatchProvidersResponse {
    #[serde(default)]
    pub results: HashMap<String, TmdbRegionProviders>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TmdbRegionProviders {
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub flatrate: Vec<TmdbProviderEntry>,
    #[serde(default)]
    pub rent: Vec<TmdbProviderEntry>,
    #[serde(default)]
    pub buy: Vec<TmdbProviderEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TmdbProviderEntry {
    #[serde(default)]
    pub provider_id: Option<u32>,
    #[serde(default)]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub logo_path: Option<String>,
}

impl TmdbRegionProviders {
    /// Subscription providers with both an id and a name
    pub fn subscription_providers(&self) -> Vec<WatchProvider> {
        self.flatrate
            .iter()
            .filter_map(|p| match (p.provider_id, p.provider_name.as_deref()) {
                (Some(id), Some(name)) if id != 0 && !name.is_empty() => Some(WatchProvider {
                    id,
                    name: name.to_string(),
                    logo_path: p.logo_path.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// OMDb API Types
// ============================================================================

/// Ratings and artwork looked up by IMDb id
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OmdbRatings {
    pub imdb_rating: Option<String>,
    pub rotten_tomatoes_rating: Option<String>,
    pub poster_url: Option<String>,
    /// Free text such as "136 min"
    pub runtime: Option<String>,
}

impl OmdbRatings {
    /// Minutes parsed from the first number in `runtime`
    pub fn runtime_minutes(&self) -> Option<u32> {
        let text = self.runtime.as_deref()?;
        RUNTIME_MINUTES.find(text)?.as_str().parse().ok()
    }
}

/// Raw OMDb lookup response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default, rename = "imdbRating")]
    pub imdb_rating: Option<String>,
    #[serde(default)]
    pub ratings: Vec<OmdbRating>,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OmdbRating {
    pub source: String,
    pub value: String,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != "N/A")
}

impl From<OmdbResponse> for OmdbRatings {
    fn from(response: OmdbResponse) -> Self {
        if response.response.as_deref() == Some("False") {
            return OmdbRatings::default();
        }

        let rotten_tomatoes_rating = response
            .ratings
            .into_iter()
            .find(|r| r.source == "Rotten Tomatoes")
            .map(|r| r.value);

        OmdbRatings {
            imdb_rating: present(response.imdb_rating),
            rotten_tomatoes_rating: present(rotten_tomatoes_rating),
            poster_url: present(response.poster),
            runtime: present(response.runtime),
        }
    }
}
