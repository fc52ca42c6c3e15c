use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        provider_names, AiSuggestion, OmdbRatings, RecommendRequest,
        RecommendResponse, Recommendation, TmdbMovie, UnmatchedRecommendation, WatchProvider,
    },
    services::{
        prompts::{
            parse_suggestions, recommendation_prompt, RECOMMENDATION_MAX_TOKENS,
            RECOMMENDATION_SYSTEM_PROMPT,
        },
        providers::{LanguageModel, MovieCatalog, RatingsSource},
        runtime_filter::{parse_runtime_constraints, RuntimeConstraints},
        search_links::search_links,
        title_matching::best_match,
    },
};

/// Catalog results kept when the language model gives nothing back
const FALLBACK_LIMIT: usize = 10;
const ACTOR_LIMIT: usize = 4;

/// Tunables of the recommendation pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSettings {
    /// Providers assumed when the request selects none
    pub default_providers: Vec<u32>,
    /// Suggestions enriched concurrently
    pub batch_size: usize,
    pub provider_fetch_attempts: u32,
    /// Attempt `n` waits `n * provider_retry_delay` before retrying
    pub provider_retry_delay: Duration,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            default_providers: vec![9, 8, 188, 337],
            batch_size: 5,
            provider_fetch_attempts: 3,
            provider_retry_delay: Duration::from_millis(500),
        }
    }
}

impl RecommendationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_providers: config.default_providers.clone(),
            batch_size: config.recommendation_batch_size.max(1),
            provider_fetch_attempts: config.provider_fetch_attempts.max(1),
            provider_retry_delay: Duration::from_millis(config.provider_retry_delay_ms),
        }
    }
}

/// A suggestion waiting to be resolved, possibly already tied to a catalog movie
#[derive(Debug, Clone)]
struct WorkItem {
    suggestion: AiSuggestion,
    movie: Option<TmdbMovie>,
}

enum Resolution {
    Matched(AiSuggestion, TmdbMovie),
    Unmatched(UnmatchedRecommendation),
}

/// A fully enriched film before it is placed in a tier
struct Enriched {
    recommendation: Recommendation,
    providers: Vec<WatchProvider>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tier {
    Main,
    OtherServices,
}

/// Why an otherwise valid film was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SkipReason {
    Duplicate,
    Documentary,
    Runtime,
}

/// Per-request state shared by the resolution and enrichment tasks
#[derive(Clone)]
struct PipelineContext {
    catalog: Arc<dyn MovieCatalog>,
    ratings: Arc<dyn RatingsSource>,
    constraints: RuntimeConstraints,
    provider_fetch_attempts: u32,
    provider_retry_delay: Duration,
}

/// Turns a free-text request into tiered, enriched recommendations
#[derive(Clone)]
pub struct Recommender {
    catalog: Arc<dyn MovieCatalog>,
    ratings: Arc<dyn RatingsSource>,
    language_model: Option<Arc<dyn LanguageModel>>,
    settings: RecommendationSettings,
}

impl Recommender {
    pub fn new(
        catalog: Arc<dyn MovieCatalog>,
        ratings: Arc<dyn RatingsSource>,
        language_model: Option<Arc<dyn LanguageModel>>,
        settings: RecommendationSettings,
    ) -> Self {
        Self {
            catalog,
            ratings,
            language_model,
            settings,
        }
    }

    pub fn language_model(&self) -> Option<&dyn LanguageModel> {
        self.language_model.as_deref()
    }

    /// Runs the full pipeline for one request.
    ///
    /// 1. Ask the language model for titles (or fall back to catalog search
    ///    and discovery).
    /// 2. Resolve each title in the catalog, dropping repeated movies.
    /// 3. Enrich with credits, ratings, trailer and providers, filtering out
    ///    documentaries and films outside the requested runtime.
    /// 4. Split into main, other-services and unmatched tiers.
    ///
    /// Only a blank query or a failed fallback lookup is an error; problems
    /// with individual titles land them in `unmatched`.
    pub async fn recommend(&self, request: RecommendRequest) -> AppResult<RecommendResponse> {
        let start = Instant::now();

        let query = request
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::InvalidInput("Query is required".to_string()))?;

        let requested = request.streaming_services.unwrap_or_default();
        let providers = if requested.is_empty() {
            self.settings.default_providers.clone()
        } else {
            requested.clone()
        };

        let constraints = parse_runtime_constraints(query);
        tracing::info!(query = %query, providers = ?providers, "Starting recommendations");
        if !constraints.is_empty() {
            tracing::info!(
                min_minutes = ?constraints.min_minutes,
                max_minutes = ?constraints.max_minutes,
                "Runtime constraints detected"
            );
        }

        let mut items: Vec<WorkItem> = self
            .suggest(query, &requested)
            .await
            .into_iter()
            .map(|suggestion| WorkItem {
                suggestion,
                movie: None,
            })
            .collect();

        if items.is_empty() {
            tracing::info!("No AI suggestions, using catalog search and discovery");
            items = self.fallback_items(query, &providers).await?;
        }

        if items.is_empty() {
            tracing::info!("No candidates found, returning empty response");
            return Ok(RecommendResponse::default());
        }

        let context = PipelineContext {
            catalog: self.catalog.clone(),
            ratings: self.ratings.clone(),
            constraints,
            provider_fetch_attempts: self.settings.provider_fetch_attempts,
            provider_retry_delay: self.settings.provider_retry_delay,
        };

        let mut seen_ids: HashSet<u64> = HashSet::new();
        let mut main = Vec::new();
        let mut other_services = Vec::new();
        let mut unmatched = Vec::new();
        let mut skipped = 0usize;

        for batch in items.chunks(self.settings.batch_size.max(1)) {
            let resolved = context.resolve_batch(batch).await;

            let mut to_enrich = Vec::new();
            for resolution in resolved {
                match resolution {
                    Resolution::Matched(suggestion, movie) => {
                        if seen_ids.insert(movie.id) {
                            to_enrich.push((suggestion, movie));
                        } else {
                            tracing::debug!(
                                movie_id = movie.id,
                                title = %suggestion.title,
                                reason = ?SkipReason::Duplicate,
                                "Skipping movie"
                            );
                            skipped += 1;
                        }
                    }
                    Resolution::Unmatched(entry) => unmatched.push(entry),
                }
            }

            for (suggestion, outcome) in context.enrich_batch(to_enrich).await {
                match outcome {
                    Ok(Some(enriched)) => {
                        let (tier, recommendation) = place(enriched, &providers);
                        tracing::debug!(
                            title = %recommendation.title,
                            tier = ?tier,
                            providers = recommendation.providers.len(),
                            "Placed recommendation"
                        );
                        match tier {
                            Tier::Main => main.push(recommendation),
                            Tier::OtherServices => other_services.push(recommendation),
                        }
                    }
                    Ok(None) => skipped += 1,
                    Err(e) => {
                        tracing::warn!(title = %suggestion.title, error = %e, "Failed to enrich movie");
                        unmatched.push(unmatched_entry(&suggestion));
                    }
                }
            }
        }

        let response = RecommendResponse {
            recommendations: dedup_by_id(main),
            other_services: dedup_by_id(other_services),
            unmatched,
        };

        tracing::info!(
            candidates = items.len(),
            main = response.recommendations.len(),
            other_services = response.other_services.len(),
            unmatched = response.unmatched.len(),
            skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Recommendations completed"
        );

        Ok(response)
    }

    /// Suggestions from the language model; any failure yields none
    async fn suggest(&self, query: &str, requested: &[u32]) -> Vec<AiSuggestion> {
        let Some(model) = &self.language_model else {
            tracing::info!("Language model not configured");
            return Vec::new();
        };

        let names = provider_names(requested);
        let prompt = recommendation_prompt(query, &names);

        match model
            .complete(RECOMMENDATION_SYSTEM_PROMPT, &prompt, RECOMMENDATION_MAX_TOKENS)
            .await
        {
            Ok(text) => {
                let suggestions = parse_suggestions(&text);
                tracing::info!(
                    count = suggestions.len(),
                    first = ?suggestions.iter().take(3).map(|s| s.title.as_str()).collect::<Vec<_>>(),
                    "AI suggestions received"
                );
                suggestions
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI recommendation failed, using fallback");
                Vec::new()
            }
        }
    }

    /// Catalog search for the raw query plus discovery on the providers,
    /// deduplicated with search results first
    async fn fallback_items(&self, query: &str, providers: &[u32]) -> AppResult<Vec<WorkItem>> {
        let (searched, discovered) = tokio::try_join!(
            self.catalog.search_movies(query),
            self.catalog.discover_by_providers(providers),
        )?;

        let reason = format!("Recommended based on your search for \"{}\"", query);
        let mut seen = HashSet::new();

        Ok(searched
            .into_iter()
            .chain(discovered)
            .filter(|movie| seen.insert(movie.id))
            .take(FALLBACK_LIMIT)
            .map(|movie| WorkItem {
                suggestion: AiSuggestion {
                    title: movie.display_title().to_string(),
                    year: movie.release_year(),
                    reason: reason.clone(),
                },
                movie: Some(movie),
            })
            .collect())
    }
}

impl PipelineContext {
    /// Resolves a batch concurrently, keeping input order
    async fn resolve_batch(&self, batch: &[WorkItem]) -> Vec<Resolution> {
        let tasks: Vec<_> = batch
            .iter()
            .cloned()
            .map(|item| {
                let context = self.clone();
                let suggestion = item.suggestion.clone();
                (
                    suggestion,
                    tokio::spawn(async move { context.resolve(item).await }),
                )
            })
            .collect();

        let mut resolved = Vec::with_capacity(tasks.len());
        for (suggestion, task) in tasks {
            match task.await {
                Ok(resolution) => resolved.push(resolution),
                Err(e) => {
                    tracing::error!(error = %e, title = %suggestion.title, "Task join error");
                    resolved.push(Resolution::Unmatched(unmatched_entry(&suggestion)));
                }
            }
        }
        resolved
    }

    async fn resolve(&self, item: WorkItem) -> Resolution {
        let WorkItem { suggestion, movie } = item;
        if let Some(movie) = movie {
            return Resolution::Matched(suggestion, movie);
        }

        let results = match self.catalog.search_movies(&suggestion.title).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(title = %suggestion.title, error = %e, "Catalog search failed");
                return Resolution::Unmatched(unmatched_entry(&suggestion));
            }
        };

        match best_match(&results, &suggestion.title, suggestion.year) {
            Some(movie) => {
                let movie = movie.clone();
                Resolution::Matched(suggestion, movie)
            }
            None => {
                tracing::info!(title = %suggestion.title, "Movie not found in catalog");
                Resolution::Unmatched(unmatched_entry(&suggestion))
            }
        }
    }

    /// Enriches a batch concurrently, keeping input order
    async fn enrich_batch(
        &self,
        batch: Vec<(AiSuggestion, TmdbMovie)>,
    ) -> Vec<(AiSuggestion, AppResult<Option<Enriched>>)> {
        let tasks: Vec<_> = batch
            .into_iter()
            .map(|(suggestion, movie)| {
                let context = self.clone();
                let task_suggestion = suggestion.clone();
                (
                    suggestion,
                    tokio::spawn(async move { context.enrich(&task_suggestion, &movie).await }),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (suggestion, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => Err(AppError::Internal(e.to_string())),
            };
            results.push((suggestion, outcome));
        }
        results
    }

    /// Builds the full recommendation for a resolved movie.
    ///
    /// Returns `Ok(None)` for films filtered out as documentaries or by runtime.
    async fn enrich(
        &self,
        suggestion: &AiSuggestion,
        movie: &TmdbMovie,
    ) -> AppResult<Option<Enriched>> {
        let (videos, external_ids, credits, details) = tokio::try_join!(
            self.catalog.movie_videos(movie.id),
            self.catalog.external_ids(movie.id),
            self.catalog.credits(movie.id),
            self.catalog.movie_details(movie.id),
        )?;

        let title = match movie.display_title() {
            "" => suggestion.title.clone(),
            title => title.to_string(),
        };

        let age_rating = match self.catalog.release_certification(movie.id).await {
            Ok(rating) => rating,
            Err(e) => {
                tracing::debug!(title = %title, error = %e, "Could not fetch age rating");
                None
            }
        };

        if details.is_documentary() {
            tracing::info!(
                title = %title,
                reason = ?SkipReason::Documentary,
                "Skipping movie"
            );
            return Ok(None);
        }

        let ratings = match external_ids.imdb_id.as_deref().filter(|id| !id.is_empty()) {
            Some(imdb_id) => self.ratings.ratings_by_imdb_id(imdb_id).await?,
            None => OmdbRatings::default(),
        };

        let runtime = details
            .known_runtime()
            .or_else(|| ratings.runtime_minutes());

        if let Some(minutes) = runtime {
            if !self.constraints.admits(minutes) {
                tracing::info!(
                    title = %title,
                    runtime = minutes,
                    min_minutes = ?self.constraints.min_minutes,
                    max_minutes = ?self.constraints.max_minutes,
                    reason = ?SkipReason::Runtime,
                    "Skipping movie"
                );
                return Ok(None);
            }
        }

        let trailer_url = videos
            .iter()
            .find(|v| v.site == "YouTube" && v.video_type == "Trailer")
            .map(|v| format!("https://www.youtube.com/watch?v={}", v.key));

        let providers = self.fetch_watch_providers(movie.id, &title).await;

        let poster_url = ratings.poster_url.clone().or_else(|| {
            movie
                .poster_path
                .as_deref()
                .filter(|p| !p.is_empty())
                .map(|p| self.catalog.image_url(p))
        });

        let release_year = movie
            .release_year()
            .or(suggestion.year)
            .map(|year| year.to_string());

        let reason = Some(suggestion.reason.trim())
            .filter(|r| !r.is_empty())
            .map(str::to_string);

        let recommendation = Recommendation {
            id: movie.id,
            title,
            overview: movie.overview.clone().unwrap_or_default(),
            poster_url,
            release_year,
            runtime,
            imdb_rating: ratings.imdb_rating,
            rotten_tomatoes_rating: ratings.rotten_tomatoes_rating,
            trailer_url,
            reason,
            director: credits.director().map(str::to_string),
            actors: credits.top_actors(ACTOR_LIMIT),
            age_rating,
            providers: Vec::new(),
        };

        Ok(Some(Enriched {
            recommendation,
            providers,
        }))
    }

    /// Subscription providers in the region, retried with a linear backoff.
    /// Giving up yields no providers rather than an error.
    async fn fetch_watch_providers(&self, movie_id: u64, title: &str) -> Vec<WatchProvider> {
        let attempts = self.provider_fetch_attempts.max(1);

        for attempt in 0..attempts {
            if attempt > 0 {
                tracing::debug!(title = %title, attempt = attempt + 1, "Retrying watch providers fetch");
                tokio::time::sleep(self.provider_retry_delay * attempt).await;
            }

            match self.catalog.watch_providers(movie_id).await {
                Ok(Some(region)) => {
                    let providers = region.subscription_providers();
                    tracing::debug!(title = %title, count = providers.len(), "Streaming providers found");
                    return providers;
                }
                Ok(None) => {
                    tracing::debug!(title = %title, "No providers listed for region");
                    return Vec::new();
                }
                Err(e) if attempt + 1 == attempts => {
                    tracing::warn!(
                        title = %title,
                        attempts,
                        error = %e,
                        "Giving up on watch providers"
                    );
                }
                Err(e) => {
                    tracing::debug!(title = %title, error = %e, "Watch providers fetch failed");
                }
            }
        }

        Vec::new()
    }
}

/// Chooses the tier and the providers shown for an enriched film.
///
/// With a provider selection, films on a selected service show only those
/// services; everything else goes to the other-services tier with its full
/// list. Without a selection every film is a main recommendation.
fn place(enriched: Enriched, selected: &[u32]) -> (Tier, Recommendation) {
    let Enriched {
        mut recommendation,
        providers,
    } = enriched;

    if selected.is_empty() {
        recommendation.providers = providers;
        return (Tier::Main, recommendation);
    }

    let matching: Vec<WatchProvider> = providers
        .iter()
        .filter(|p| selected.contains(&p.id))
        .cloned()
        .collect();

    if matching.is_empty() {
        recommendation.providers = providers;
        (Tier::OtherServices, recommendation)
    } else {
        recommendation.providers = matching;
        (Tier::Main, recommendation)
    }
}

/// Keeps the first recommendation for each movie id
fn dedup_by_id(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    let mut seen = HashSet::new();
    recommendations
        .into_iter()
        .filter(|rec| {
            let first = seen.insert(rec.id);
            if !first {
                tracing::debug!(movie_id = rec.id, title = %rec.title, "Removing duplicate");
            }
            first
        })
        .collect()
}

fn unmatched_entry(suggestion: &AiSuggestion) -> UnmatchedRecommendation {
    UnmatchedRecommendation {
        title: suggestion.title.clone(),
        year: suggestion.year,
        reason: suggestion.reason.clone(),
        search_links: search_links(&suggestion.title, suggestion.year),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        TmdbCredits, TmdbCrewMember, TmdbCastMember, TmdbExternalIds, TmdbGenre,
        TmdbMovieDetails, TmdbProviderEntry, TmdbRegionProviders, TmdbVideo,
    };
    use crate::services::providers::{MockLanguageModel, MockMovieCatalog, MockRatingsSource};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn movie(id: u64, title: &str, year: i32) -> TmdbMovie {
        TmdbMovie {
            id,
            title: Some(title.to_string()),
            name: None,
            overview: Some(format!("Overview of {}", title)),
            release_date: Some(format!("{}-01-01", year)),
            poster_path: Some(format!("/{}.jpg", id)),
        }
    }

    fn provider(id: u32, name: &str) -> TmdbProviderEntry {
        TmdbProviderEntry {
            provider_id: Some(id),
            provider_name: Some(name.to_string()),
            logo_path: None,
        }
    }

    /// Per-movie metadata served by the mock catalog
    #[derive(Clone)]
    struct Fixture {
        movie: TmdbMovie,
        runtime: Option<u32>,
        genres: Vec<u32>,
        imdb_id: Option<String>,
        providers: Option<Vec<TmdbProviderEntry>>,
    }

    fn fixture(id: u64, title: &str, year: i32, providers: &[(u32, &str)]) -> Fixture {
        Fixture {
            movie: movie(id, title, year),
            runtime: Some(100),
            genres: vec![18],
            imdb_id: Some(format!("tt{:07}", id)),
            providers: Some(providers.iter().map(|(id, n)| provider(*id, n)).collect()),
        }
    }

    fn catalog_with(fixtures: Vec<Fixture>) -> MockMovieCatalog {
        let by_id: Arc<HashMap<u64, Fixture>> =
            Arc::new(fixtures.iter().cloned().map(|f| (f.movie.id, f)).collect());
        let all: Arc<Vec<Fixture>> = Arc::new(fixtures);

        let mut catalog = MockMovieCatalog::new();

        let search_all = all.clone();
        catalog.expect_search_movies().returning(move |query| {
            let q = query.to_lowercase();
            Ok(search_all
                .iter()
                .filter(|f| f.movie.display_title().to_lowercase().contains(&q))
                .map(|f| f.movie.clone())
                .collect())
        });

        let discover_all = all.clone();
        catalog
            .expect_discover_by_providers()
            .returning(move |_| Ok(discover_all.iter().map(|f| f.movie.clone()).collect()));

        catalog.expect_movie_videos().returning(|id| {
            Ok(vec![
                TmdbVideo {
                    key: format!("teaser{}", id),
                    site: "YouTube".to_string(),
                    video_type: "Teaser".to_string(),
                },
                TmdbVideo {
                    key: format!("trailer{}", id),
                    site: "YouTube".to_string(),
                    video_type: "Trailer".to_string(),
                },
            ])
        });

        let ids = by_id.clone();
        catalog.expect_external_ids().returning(move |id| {
            Ok(TmdbExternalIds {
                imdb_id: ids.get(&id).and_then(|f| f.imdb_id.clone()),
            })
        });

        catalog.expect_credits().returning(|_| {
            Ok(TmdbCredits {
                cast: vec![TmdbCastMember {
                    name: "Lead Actor".to_string(),
                    character: None,
                }],
                crew: vec![TmdbCrewMember {
                    name: "The Director".to_string(),
                    job: "Director".to_string(),
                }],
            })
        });

        let details = by_id.clone();
        catalog.expect_movie_details().returning(move |id| {
            let f = details
                .get(&id)
                .ok_or_else(|| AppError::ExternalApi(format!("unknown movie {}", id)))?;
            Ok(TmdbMovieDetails {
                id,
                genres: f
                    .genres
                    .iter()
                    .map(|&g| TmdbGenre { id: g, name: None })
                    .collect(),
                runtime: f.runtime,
            })
        });

        catalog
            .expect_release_certification()
            .returning(|_| Ok(Some("15".to_string())));

        let watch = by_id.clone();
        catalog.expect_watch_providers().returning(move |id| {
            Ok(watch.get(&id).and_then(|f| f.providers.clone()).map(|flatrate| {
                TmdbRegionProviders {
                    flatrate,
                    ..TmdbRegionProviders::default()
                }
            }))
        });

        catalog
            .expect_image_url()
            .returning(|path| format!("https://img.test/w342{}", path));

        catalog
    }

    fn ratings_none() -> MockRatingsSource {
        let mut ratings = MockRatingsSource::new();
        ratings
            .expect_ratings_by_imdb_id()
            .returning(|_| Ok(OmdbRatings::default()));
        ratings
    }

    fn model_replying(reply: &'static str) -> MockLanguageModel {
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(move |_, _, _| Ok(reply.to_string()));
        model
    }

    fn fast_settings() -> RecommendationSettings {
        RecommendationSettings {
            provider_retry_delay: Duration::from_millis(1),
            ..RecommendationSettings::default()
        }
    }

    fn recommender(
        catalog: MockMovieCatalog,
        ratings: MockRatingsSource,
        model: Option<MockLanguageModel>,
    ) -> Recommender {
        Recommender::new(
            Arc::new(catalog),
            Arc::new(ratings),
            model.map(|m| Arc::new(m) as Arc<dyn LanguageModel>),
            fast_settings(),
        )
    }

    fn request(query: &str, services: &[u32]) -> RecommendRequest {
        RecommendRequest {
            query: Some(query.to_string()),
            streaming_services: Some(services.to_vec()),
        }
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let rec = recommender(MockMovieCatalog::new(), MockRatingsSource::new(), None);

        let err = rec.recommend(request("   ", &[])).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));

        let err = rec.recommend(RecommendRequest::default()).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_tiers_follow_selected_providers() {
        let catalog = catalog_with(vec![
            fixture(1, "Stalker", 1979, &[(8, "Netflix"), (526, "Mubi")]),
            fixture(2, "Solaris", 1972, &[(15, "Hulu")]),
            fixture(3, "Mirror", 1975, &[]),
        ]);
        let model = model_replying(
            r#"[
                {"title": "Stalker", "year": 1979, "reason": "Zone."},
                {"title": "Solaris", "year": 1972, "reason": "Ocean."},
                {"title": "Mirror", "year": 1975, "reason": "Memory."}
            ]"#,
        );
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec.recommend(request("Tarkovsky", &[526])).await.unwrap();

        assert_eq!(response.recommendations.len(), 1);
        let stalker = &response.recommendations[0];
        assert_eq!(stalker.title, "Stalker");
        assert_eq!(stalker.providers.len(), 1);
        assert_eq!(stalker.providers[0].name, "Mubi");
        assert_eq!(stalker.reason.as_deref(), Some("Zone."));
        assert_eq!(stalker.director.as_deref(), Some("The Director"));
        assert_eq!(stalker.actors, vec!["Lead Actor"]);
        assert_eq!(stalker.age_rating.as_deref(), Some("15"));
        assert_eq!(
            stalker.trailer_url.as_deref(),
            Some("https://www.youtube.com/watch?v=trailer1")
        );
        assert_eq!(stalker.poster_url.as_deref(), Some("https://img.test/w342/1.jpg"));
        assert_eq!(stalker.release_year.as_deref(), Some("1979"));

        let other: Vec<&str> = response.other_services.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(other, vec!["Solaris", "Mirror"]);
        assert_eq!(response.other_services[0].providers[0].name, "Hulu");
        assert!(response.other_services[1].providers.is_empty());
        assert!(response.unmatched.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_title_is_unmatched_with_links() {
        let catalog = catalog_with(vec![fixture(1, "Stalker", 1979, &[(8, "Netflix")])]);
        let model = model_replying(
            r#"[{"title": "A Film Nobody Indexed", "year": 2003, "reason": "Rare."}]"#,
        );
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec.recommend(request("obscure", &[8])).await.unwrap();

        assert!(response.recommendations.is_empty());
        assert_eq!(response.unmatched.len(), 1);
        let entry = &response.unmatched[0];
        assert_eq!(entry.title, "A Film Nobody Indexed");
        assert_eq!(entry.year, Some(2003));
        assert_eq!(entry.reason, "Rare.");
        assert!(entry.search_links.imdb.contains("A+Film+Nobody+Indexed+2003"));
    }

    #[tokio::test]
    async fn test_duplicate_movies_kept_once() {
        let catalog = catalog_with(vec![fixture(7, "Stalker", 1979, &[(8, "Netflix")])]);
        let model = model_replying(
            r#"[
                {"title": "Stalker", "reason": "First."},
                {"title": "stalker", "reason": "Second."},
                {"title": "STALKER", "year": 1979, "reason": "Third."}
            ]"#,
        );
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec.recommend(request("zone", &[8])).await.unwrap();

        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].reason.as_deref(), Some("First."));
        assert!(response.other_services.is_empty());
        assert!(response.unmatched.is_empty());
    }

    #[tokio::test]
    async fn test_duplicates_across_batches() {
        let catalog = catalog_with(vec![
            fixture(1, "Alpha", 2001, &[(8, "Netflix")]),
            fixture(2, "Beta", 2002, &[(8, "Netflix")]),
        ]);
        let model = model_replying(
            r#"[{"title": "Alpha"}, {"title": "Beta"}, {"title": "Alpha"}, {"title": "Beta"}]"#,
        );
        let mut rec = recommender(catalog, ratings_none(), Some(model));
        rec.settings.batch_size = 2;

        let response = rec.recommend(request("letters", &[8])).await.unwrap();

        let titles: Vec<&str> = response.recommendations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn test_documentaries_and_runtime_filtered() {
        let mut documentary = fixture(1, "Koyaanisqatsi", 1982, &[(8, "Netflix")]);
        documentary.genres = vec![99];
        let mut long_film = fixture(2, "Satantango", 1994, &[(8, "Netflix")]);
        long_film.runtime = Some(439);
        let mut unknown_runtime = fixture(3, "Damnation", 1988, &[(8, "Netflix")]);
        unknown_runtime.runtime = None;
        let short_film = fixture(4, "La Jetee", 1962, &[(8, "Netflix")]);

        let catalog = catalog_with(vec![documentary, long_film, unknown_runtime, short_film]);
        let model = model_replying(
            r#"[{"title": "Koyaanisqatsi"}, {"title": "Satantango"}, {"title": "Damnation"}, {"title": "La Jetee"}]"#,
        );
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec
            .recommend(request("hypnotic films under 2 hours", &[8]))
            .await
            .unwrap();

        let titles: Vec<&str> = response.recommendations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Damnation", "La Jetee"]);
        assert!(response.unmatched.is_empty());
    }

    #[tokio::test]
    async fn test_omdb_runtime_and_poster_used() {
        let mut film = fixture(5, "Werckmeister Harmonies", 2000, &[(526, "Mubi")]);
        film.runtime = None;
        let catalog = catalog_with(vec![film]);

        let mut ratings = MockRatingsSource::new();
        ratings
            .expect_ratings_by_imdb_id()
            .withf(|id| id == "tt0000005")
            .returning(|_| {
                Ok(OmdbRatings {
                    imdb_rating: Some("8.0".to_string()),
                    rotten_tomatoes_rating: Some("97%".to_string()),
                    poster_url: Some("https://omdb.test/poster.jpg".to_string()),
                    runtime: Some("145 min".to_string()),
                })
            });

        let model = model_replying(r#"[{"title": "Werckmeister Harmonies", "year": 2000}]"#);
        let rec = recommender(catalog, ratings, Some(model));

        let response = rec.recommend(request("whales", &[526])).await.unwrap();
        let film = &response.recommendations[0];

        assert_eq!(film.runtime, Some(145));
        assert_eq!(film.imdb_rating.as_deref(), Some("8.0"));
        assert_eq!(film.rotten_tomatoes_rating.as_deref(), Some("97%"));
        assert_eq!(film.poster_url.as_deref(), Some("https://omdb.test/poster.jpg"));
        assert_eq!(film.reason, None);
    }

    #[tokio::test]
    async fn test_enrichment_failure_lands_in_unmatched() {
        let catalog = catalog_with(vec![fixture(1, "Stalker", 1979, &[(8, "Netflix")])]);
        let mut ratings = MockRatingsSource::new();
        ratings
            .expect_ratings_by_imdb_id()
            .returning(|_| Err(AppError::ExternalApi("omdb down".to_string())));
        let model = model_replying(r#"[{"title": "Stalker", "year": 1979, "reason": "Zone."}]"#);
        let rec = recommender(catalog, ratings, Some(model));

        let response = rec.recommend(request("zone", &[8])).await.unwrap();

        assert!(response.recommendations.is_empty());
        assert_eq!(response.unmatched.len(), 1);
        assert_eq!(response.unmatched[0].title, "Stalker");
    }

    #[tokio::test]
    async fn test_watch_providers_retried_then_succeed() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_search_movies()
            .returning(|_| Ok(vec![movie(1, "Stalker", 1979)]));
        catalog.expect_movie_videos().returning(|_| Ok(vec![]));
        catalog
            .expect_external_ids()
            .returning(|_| Ok(TmdbExternalIds::default()));
        catalog
            .expect_credits()
            .returning(|_| Ok(TmdbCredits::default()));
        catalog.expect_movie_details().returning(|id| {
            Ok(TmdbMovieDetails {
                id,
                genres: vec![],
                runtime: Some(162),
            })
        });
        catalog
            .expect_release_certification()
            .returning(|_| Err(AppError::ExternalApi("no dates".to_string())));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        catalog.expect_watch_providers().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::ExternalApi("flaky".to_string()))
            } else {
                Ok(Some(TmdbRegionProviders {
                    flatrate: vec![provider(8, "Netflix")],
                    ..TmdbRegionProviders::default()
                }))
            }
        });
        catalog
            .expect_image_url()
            .returning(|path| format!("https://img.test{}", path));

        let model = model_replying(r#"[{"title": "Stalker"}]"#);
        let rec = recommender(catalog, MockRatingsSource::new(), Some(model));

        let response = rec.recommend(request("zone", &[8])).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(response.recommendations.len(), 1);
        assert_eq!(response.recommendations[0].providers[0].id, 8);
        assert_eq!(response.recommendations[0].age_rating, None);
    }

    #[tokio::test]
    async fn test_watch_providers_give_up_after_attempts() {
        let mut catalog = MockMovieCatalog::new();
        catalog
            .expect_search_movies()
            .returning(|_| Ok(vec![movie(1, "Stalker", 1979)]));
        catalog.expect_movie_videos().returning(|_| Ok(vec![]));
        catalog
            .expect_external_ids()
            .returning(|_| Ok(TmdbExternalIds::default()));
        catalog
            .expect_credits()
            .returning(|_| Ok(TmdbCredits::default()));
        catalog.expect_movie_details().returning(|id| {
            Ok(TmdbMovieDetails {
                id,
                genres: vec![],
                runtime: None,
            })
        });
        catalog
            .expect_release_certification()
            .returning(|_| Ok(None));
        catalog
            .expect_watch_providers()
            .times(3)
            .returning(|_| Err(AppError::ExternalApi("down".to_string())));
        catalog
            .expect_image_url()
            .returning(|path| format!("https://img.test{}", path));

        let model = model_replying(r#"[{"title": "Stalker"}]"#);
        let rec = recommender(catalog, MockRatingsSource::new(), Some(model));

        let response = rec.recommend(request("zone", &[8])).await.unwrap();

        assert!(response.recommendations.is_empty());
        assert_eq!(response.other_services.len(), 1);
        assert!(response.other_services[0].providers.is_empty());
    }

    #[tokio::test]
    async fn test_fallback_when_model_fails() {
        let catalog = catalog_with(vec![
            fixture(1, "Cure", 1997, &[(9, "Amazon Prime Video")]),
            fixture(2, "Pulse", 2001, &[(8, "Netflix")]),
        ]);

        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .returning(|_, _, _| Err(AppError::ExternalApi("overloaded".to_string())));
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec.recommend(request("cure", &[])).await.unwrap();

        // No selection means the default providers (which include 8 and 9)
        let titles: Vec<&str> = response.recommendations.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Cure", "Pulse"]);
        assert_eq!(
            response.recommendations[0].reason.as_deref(),
            Some("Recommended based on your search for \"cure\"")
        );
    }

    #[tokio::test]
    async fn test_fallback_without_model_and_nothing_found() {
        let mut catalog = MockMovieCatalog::new();
        catalog.expect_search_movies().returning(|_| Ok(vec![]));
        catalog
            .expect_discover_by_providers()
            .withf(|ids| ids == [9, 8, 188, 337])
            .returning(|_| Ok(vec![]));
        let rec = recommender(catalog, MockRatingsSource::new(), None);

        let response = rec.recommend(request("anything", &[])).await.unwrap();
        assert_eq!(response, RecommendResponse::default());
    }

    #[tokio::test]
    async fn test_prompt_names_only_user_selected_services() {
        let catalog = catalog_with(vec![]);
        let mut model = MockLanguageModel::new();
        model
            .expect_complete()
            .withf(|system, prompt, max_tokens| {
                system == RECOMMENDATION_SYSTEM_PROMPT
                    && prompt.contains("available on Mubi, BFI Player in the UK")
                    && *max_tokens == RECOMMENDATION_MAX_TOKENS
            })
            .times(1)
            .returning(|_, _, _| Ok("[]".to_string()));
        let rec = recommender(catalog, ratings_none(), Some(model));

        let response = rec.recommend(request("british new wave", &[526, 682, 99999])).await.unwrap();
        assert!(response.recommendations.is_empty());
    }

    fn enriched(id: u64, providers: Vec<WatchProvider>) -> Enriched {
        Enriched {
            recommendation: Recommendation {
                id,
                title: format!("Movie {}", id),
                overview: String::new(),
                poster_url: None,
                release_year: None,
                runtime: None,
                imdb_rating: None,
                rotten_tomatoes_rating: None,
                trailer_url: None,
                reason: None,
                director: None,
                actors: vec![],
                age_rating: None,
                providers: vec![],
            },
            providers,
        }
    }

    fn watch(id: u32) -> WatchProvider {
        WatchProvider {
            id,
            name: format!("Provider {}", id),
            logo_path: None,
        }
    }

    #[test]
    fn test_place_without_selection_keeps_all_providers() {
        let (tier, rec) = place(enriched(1, vec![watch(8), watch(15)]), &[]);
        assert_eq!(tier, Tier::Main);
        assert_eq!(rec.providers.len(), 2);
    }

    #[test]
    fn test_place_shows_only_selected_providers() {
        let (tier, rec) = place(enriched(1, vec![watch(8), watch(15)]), &[15, 526]);
        assert_eq!(tier, Tier::Main);
        assert_eq!(rec.providers, vec![watch(15)]);
    }

    #[test]
    fn test_place_other_services() {
        let (tier, rec) = place(enriched(1, vec![watch(8)]), &[526]);
        assert_eq!(tier, Tier::OtherServices);
        assert_eq!(rec.providers, vec![watch(8)]);

        let (tier, rec) = place(enriched(2, vec![]), &[526]);
        assert_eq!(tier, Tier::OtherServices);
        assert!(rec.providers.is_empty());
    }

    #[test]
    fn test_dedup_by_id_keeps_first() {
        let mut first = enriched(1, vec![]).recommendation;
        first.title = "First".to_string();
        let mut again = enriched(1, vec![]).recommendation;
        again.title = "Again".to_string();
        let other = enriched(2, vec![]).recommendation;

        let result = dedup_by_id(vec![first, other, again]);
        let titles: Vec<&str> = result.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Movie 2"]);
    }
}
