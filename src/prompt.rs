use anyhow::{Context, Result};
use tera::{Context as TeraContext, Tera};

const TRANSCRIBE_TEMPLATE: &str = include_str!("prompts/transcribe.tera");

/// Renders the transcription instructions. `domain` is the optional subject
/// hint sent with the request.
pub fn render_transcribe_prompt(domain: Option<&str>) -> Result<String> {
    let mut context = TeraContext::new();
    let domain = domain.map(str::trim).filter(|value| !value.is_empty());
    context.insert("domain", &domain);
    Tera::one_off(TRANSCRIBE_TEMPLATE, &context, false)
        .with_context(|| "failed to render transcription prompt")
}
