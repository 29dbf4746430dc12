use quorum_models::advisory::RiskAssessmentResponse;

use crate::error::AgentError;

/// Extract the first JSON object from a string that may contain surrounding text.
///
/// Handles the common CLI response formats:
/// - Clean JSON: `{"key": "value"}`
/// - Markdown-wrapped: ```json\n{"key": "value"}\n```
/// - Prefix text: `Here is the analysis:\n{"key": "value"}`
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();

    let found = std::iter::once(trimmed.to_string())
        .filter(|whole| whole.starts_with('{') && is_object(whole))
        .chain(fenced_blocks(trimmed).filter(|body| is_object(body)))
        .chain(std::iter::once_with(|| embedded_object(trimmed)).flatten())
        .next();

    found.ok_or_else(|| {
        AgentError::Parse(format!(
            "No JSON object in advisor output ({} bytes)",
            text.len()
        ))
    })
}

fn is_object(candidate: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(candidate),
        Ok(serde_json::Value::Object(_))
    )
}

/// Bodies of fenced blocks (```json or bare ```), in order.
fn fenced_blocks(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split("```")
        .skip(1)
        .step_by(2)
        .map(|block| block.strip_prefix("json").unwrap_or(block).trim().to_string())
}

/// First `{` from which a complete JSON object parses. The deserializer
/// handles braces inside strings.
fn embedded_object(text: &str) -> Option<String> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(serde_json::Value::Object(_))) => {
                let end = start + stream.byte_offset();
                Some(text[start..end].to_string())
            }
            _ => None,
        }
    })
}

/// Parse and validate a risk assessment from raw CLI output.
///
/// A response that parses but breaks the numeric contract is a parse error.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessmentResponse, AgentError> {
    let json_str = extract_json(raw)?;
    let response: RiskAssessmentResponse = serde_json::from_str(&json_str).map_err(|e| {
        AgentError::Parse(format!(
            "Failed to parse risk assessment: {e}\nJSON: {json_str}"
        ))
    })?;
    response
        .validate()
        .map_err(|reason| AgentError::Parse(format!("Risk assessment rejected: {reason}")))?;
    Ok(response)
}
