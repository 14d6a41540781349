//! Recovery of a single JSON object from free-form model output.
//!
//! Stage one strips markdown fences and parses strictly. Stage two looks for a fenced
//! block or the first balanced `{...}` span inside surrounding prose and parses that,
//! first strictly and then as relaxed JSON5. Every function here is pure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use thiserror::Error;

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?i:json)?[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("model reply was empty")]
    Empty,
    #[error("model reply did not contain a recoverable JSON object: {reason}")]
    Unrecoverable { reason: String },
}

/// Parse `raw` into `T`, repairing common model formatting mistakes.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, ReplyError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ReplyError::Empty);
    }

    let stripped = strip_code_fence(trimmed).unwrap_or_else(|| trimmed.to_string());
    let strict_err = match serde_json::from_str::<T>(&stripped) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    for candidate in recovery_candidates(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(&candidate) {
            return Ok(value);
        }
        if let Ok(value) = json5::from_str::<T>(&candidate) {
            return Ok(value);
        }
    }

    Err(ReplyError::Unrecoverable {
        reason: strict_err.to_string(),
    })
}

fn recovery_candidates(raw: &str) -> Vec<String> {
    let mut candidates = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };
    if let Some(block) = extract_fenced_block(raw) {
        if let Some(object) = extract_first_object(block) {
            push(object.to_string());
        }
    }
    if let Some(object) = extract_first_object(raw) {
        push(object.to_string());
        push(sanitize_json_strings(object));
    } else if let Some(start) = raw.find('{') {
        // Unbalanced: the reply was most likely cut off mid-object.
        push(sanitize_json_strings(&raw[start..]));
    }
    candidates
}

/// Remove a surrounding markdown fence (with optional `json` tag).
pub fn strip_code_fence(input: &str) -> Option<String> {
    let mut trimmed = input.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    trimmed = trimmed.trim_start_matches("```");
    trimmed = trimmed.trim_start_matches(|c: char| c.is_ascii_whitespace());
    if trimmed
        .get(..4)
        .is_some_and(|tag| tag.eq_ignore_ascii_case("json"))
    {
        trimmed = trimmed[4..].trim_start_matches(|c: char| c.is_ascii_whitespace());
    }
    let end = trimmed.rfind("```").unwrap_or(trimmed.len());
    Some(trimmed[..end].trim().to_string())
}

/// Contents of the first fenced block appearing anywhere in `input`.
pub fn extract_fenced_block(input: &str) -> Option<&str> {
    FENCED_BLOCK
        .captures(input)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|block| !block.is_empty())
}

/// First balanced `{...}` span, ignoring braces inside string literals.
pub fn extract_first_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match (escape, ch) {
                (true, _) => escape = false,
                (false, '\\') => escape = true,
                (false, '"') => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Escape raw newlines inside strings and close unterminated strings/brackets.
pub fn sanitize_json_strings(payload: &str) -> String {
    let mut result = String::with_capacity(payload.len());
    let mut in_string = false;
    let mut escape = false;

    for ch in payload.chars() {
        if in_string {
            if escape {
                result.push(ch);
                escape = false;
            } else {
                match ch {
                    '\\' => {
                        result.push(ch);
                        escape = true;
                    }
                    '"' => {
                        result.push(ch);
                        in_string = false;
                    }
                    '\n' => result.push_str("\\n"),
                    '\r' => {}
                    _ => result.push(ch),
                }
            }
        } else {
            result.push(ch);
            if ch == '"' {
                in_string = true;
            }
        }
    }

    if in_string {
        result.push('"');
    }

    let open_brackets = result.chars().filter(|&c| c == '[').count();
    let close_brackets = result.chars().filter(|&c| c == ']').count();
    for _ in close_brackets..open_brackets {
        result.push(']');
    }

    let open_braces = result.chars().filter(|&c| c == '{').count();
    let close_braces = result.chars().filter(|&c| c == '}').count();
    for _ in close_braces..open_braces {
        result.push('}');
    }

    result
}
