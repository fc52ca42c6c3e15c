use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{AiSuggestion, SearchExamples};

pub const RECOMMENDATION_SYSTEM_PROMPT: &str =
    "You are a movie recommendation expert. Always return valid JSON only.";

pub const EXAMPLES_SYSTEM_PROMPT: &str =
    "You are a movie recommendation expert. Always return valid JSON only, no markdown, no extra text.";

pub const RECOMMENDATION_MAX_TOKENS: u32 = 2000;
pub const EXAMPLES_MAX_TOKENS: u32 = 500;

static JSON_ARRAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[\s\S]*\]").expect("array pattern should compile"));

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("object pattern should compile"));

/// Prompt asking the model for 10-12 titles matching `query`.
///
/// `service_names` restricts the request to titles on those services in the UK.
pub fn recommendation_prompt(query: &str, service_names: &[&str]) -> String {
    let services_text = if service_names.is_empty() {
        String::new()
    } else {
        format!(" available on {} in the UK", service_names.join(", "))
    };

    format!(
        r#"User query: "{query}"

Generate 10-12 movie recommendations{services_text}. Prioritize:
1. Arthouse, international, and lesser-known films (60-70% of recommendations)
2. Hidden gems and critically acclaimed but underappreciated films
3. A mix of mainstream and arthouse to ensure diversity
4. Films that match any specific criteria mentioned (ratings, runtime, genres, directors, actors, themes)

Return ONLY a JSON array of objects with this exact structure:
[
  {{"title": "Movie Title", "year": 2020, "reason": "One sentence explaining why the user might like this film based on their query. Be specific about what makes it special - cinematography, themes, performances, or unique storytelling."}}
]

Requirements:
- Return ONLY valid JSON, no markdown, no explanations
- Match the user's preferences from their query (actors, directors, genres, themes, ratings, runtime, etc.)
- Include diverse recommendations (mix of genres, eras, countries)
- Prefer arthouse, international, and lesser-known films over blockbusters
- Reasons should be specific, insightful, and avoid spoilers
- If year is unknown, omit it
- Prioritize quality films that the user may not have discovered yet"#
    )
}

pub fn examples_prompt() -> &'static str {
    r#"Generate fresh, varied movie search examples. Return ONLY a JSON object with these exact keys (no markdown, no extra text):

{
  "director": "one obscure or interesting director name (e.g., 'Apichatpong Weerasethakul', 'Lucrecia Martel', 'Céline Sciamma')",
  "actor": "one obscure or interesting actor name (e.g., 'Tilda Swinton', 'Willem Dafoe', 'Isabelle Huppert')",
  "genre": "one arthouse or niche genre term (e.g., 'slow cinema', 'experimental films', 'postmodern cinema', 'contemporary world cinema')",
  "theme": "one interesting movie theme (e.g., 'existentialism', 'memory and time', 'urban alienation', 'moral ambiguity')",
  "ratingFilter": "one rating filter phrase (e.g., 'rating over 7 on IMDB', 'IMDB rating over 7.5', 'highly rated')",
  "runtimeFilter": "one runtime filter phrase (e.g., 'running time less than 2 hours', 'movies under 90 minutes', 'films under 100 minutes')"
}

Make each suggestion:
- Different from common/mainstream choices
- Culturally diverse (international directors/actors)
- Varied each time (don't repeat the same examples)
- Appropriate for arthouse/indie film enthusiasts
- Real and recognizable (not made-up names)

Return only valid JSON, no explanation."#
}

fn extract<'a>(pattern: &Regex, text: &'a str) -> &'a str {
    pattern
        .find(text)
        .map(|m| m.as_str())
        .unwrap_or(text)
}

/// Suggestions from a model reply, tolerating code fences and chatter.
///
/// Entries that are not objects or lack a title are dropped; an unparseable
/// reply yields no suggestions.
pub fn parse_suggestions(text: &str) -> Vec<AiSuggestion> {
    let json = extract(&JSON_ARRAY, text.trim());

    let values: Vec<serde_json::Value> = match serde_json::from_str(json) {
        Ok(serde_json::Value::Array(values)) => values,
        Ok(_) => return Vec::new(),
        Err(e) => {
            tracing::warn!(error = %e, response = %text, "Failed to parse AI recommendations");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<AiSuggestion>(value).ok())
        .filter(|s| !s.title.trim().is_empty())
        .map(|mut s| {
            s.title = s.title.trim().to_string();
            s
        })
        .collect()
}

/// Search examples from a model reply, if every field is present
pub fn parse_examples(text: &str) -> Option<SearchExamples> {
    let json = extract(&JSON_OBJECT, text.trim());
    serde_json::from_str::<SearchExamples>(json)
        .ok()
        .filter(SearchExamples::is_complete)
}
