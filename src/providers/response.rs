use crate::entity::Entity;
use crate::error::ClassifyError;
use log::error;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```$").expect("valid fence pattern")
});

/// Removes one surrounding markdown code fence, if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Turns a provider text payload into entities. Accepts a bare list or an
/// object with an `entities` list, optionally fenced.
pub fn parse_entities(raw: &str) -> Result<Vec<Entity>, ClassifyError> {
    let body = strip_code_fences(raw);
    if body.is_empty() {
        return Err(ClassifyError::response_format("empty response body", raw));
    }

    let value: Value = serde_json::from_str(body).map_err(|e| {
        error!("Provider returned non-JSON entities: {}; raw={}", e, raw);
        ClassifyError::response_format(format!("invalid JSON: {}", e), raw)
    })?;

    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => match map.remove("entities") {
            Some(list @ Value::Array(_)) => list,
            _ => {
                error!("Provider response has no entities list; raw={}", raw);
                return Err(ClassifyError::response_format(
                    "object without an entities list",
                    raw,
                ));
            }
        },
        _ => {
            error!("Provider response is neither a list nor an object; raw={}", raw);
            return Err(ClassifyError::response_format(
                "expected a list of entities",
                raw,
            ));
        }
    };

    serde_json::from_value::<Vec<Entity>>(list).map_err(|e| {
        error!("Provider entities do not match the schema: {}; raw={}", e, raw);
        ClassifyError::response_format(format!("schema mismatch: {}", e), raw)
    })
}
