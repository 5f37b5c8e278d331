use serde::de::DeserializeOwned;

/// Decoded form of an assistant reply that was asked for JSON.
///
/// Models do not reliably honor "respond only with JSON", so every consumer
/// handles both variants: a strict schema decode, or the raw text when the
/// reply does not validate.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantReply<T> {
    Structured(T),
    Raw(String),
}

/// Attempt a strict schema decode of an assistant reply, falling back to the
/// raw text. Field presence is validated by the target type's deserializer;
/// a partial or malformed payload lands in `Raw`.
pub fn parse_reply<T: DeserializeOwned>(response: &str) -> AssistantReply<T> {
    if let Some(json) = extract_json(response) {
        if let Ok(value) = serde_json::from_str::<T>(json) {
            return AssistantReply::Structured(value);
        }
    }
    AssistantReply::Raw(response.trim().to_string())
}

/// Find the JSON payload inside a reply: a fenced code block if present,
/// otherwise the outermost object or array literal.
fn extract_json(response: &str) -> Option<&str> {
    if let Some(fenced) = extract_fenced(response) {
        return Some(fenced);
    }

    let obj = span(response, '{', '}');
    let arr = span(response, '[', ']');
    match (obj, arr) {
        (Some(o), Some(a)) => {
            if a.0 < o.0 {
                Some(&response[a.0..a.1])
            } else {
                Some(&response[o.0..o.1])
            }
        }
        (Some(o), None) => Some(&response[o.0..o.1]),
        (None, Some(a)) => Some(&response[a.0..a.1]),
        (None, None) => None,
    }
}

fn span(s: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = s.find(open)?;
    let end = s.rfind(close)?;
    if end < start {
        return None;
    }
    Some((start, end + close.len_utf8()))
}

fn extract_fenced(response: &str) -> Option<&str> {
    let start = response.find("```")?;
    let after_fence = &response[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let body_end = body.find("```")?;
    let inner = body[..body_end].trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}
