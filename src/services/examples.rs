use crate::{
    error::{AppError, AppResult},
    models::SearchExamples,
    services::{
        prompts::{examples_prompt, parse_examples, EXAMPLES_MAX_TOKENS, EXAMPLES_SYSTEM_PROMPT},
        providers::LanguageModel,
    },
};

/// Fresh search examples from the language model.
///
/// Fails only when no model is configured. A failed call or an incomplete
/// reply falls back to the built-in examples.
pub async fn generate_examples(model: Option<&dyn LanguageModel>) -> AppResult<SearchExamples> {
    let Some(model) = model else {
        return Err(AppError::Internal("AI service not configured".to_string()));
    };

    let reply = match model
        .complete(EXAMPLES_SYSTEM_PROMPT, examples_prompt(), EXAMPLES_MAX_TOKENS)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(error = %e, model = model.name(), "Example generation failed, using defaults");
            return Ok(SearchExamples::default());
        }
    };

    match parse_examples(&reply) {
        Some(examples) => Ok(examples),
        None => {
            tracing::warn!(response = %reply, "Incomplete examples from model, using defaults");
            Ok(SearchExamples::default())
        }
    }
}
