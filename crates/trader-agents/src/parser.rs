use rust_decimal::Decimal;
use trader_models::AnalystResponse;

use crate::error::AgentError;

/// Pull the JSON object out of a Claude reply.
///
/// Accepts a bare object, an object inside a ```json fenced block, or an
/// object embedded in surrounding prose. Each candidate must parse as JSON.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    let candidates = [
        Some(trimmed.to_string()).filter(|t| t.starts_with('{')),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|candidate| serde_json::from_str::<serde_json::Value>(candidate).is_ok())
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

/// Contents of the first ``` fence, with or without a `json` tag.
fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

/// First `{ ... }` whose braces balance, ignoring braces inside strings.
fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse an [`AnalystResponse`] from raw CLI output and check its confidence.
pub fn parse_analyst_response(raw: &str) -> Result<AnalystResponse, AgentError> {
    let json = extract_json(raw)?;
    let response: AnalystResponse = serde_json::from_str(&json)
        .map_err(|e| AgentError::Parse(format!("Failed to parse AnalystResponse: {e}")))?;

    if response.confidence < Decimal::ZERO || response.confidence > Decimal::ONE {
        return Err(AgentError::Parse(format!(
            "confidence {} outside [0, 1]",
            response.confidence
        )));
    }

    Ok(response)
}
