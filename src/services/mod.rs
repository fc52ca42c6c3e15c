pub mod examples;
pub mod prompts;
pub mod providers;
pub mod recommendations;
pub mod runtime_filter;
pub mod search_links;
pub mod title_matching;

pub use recommendations::{RecommendationSettings, Recommender};
