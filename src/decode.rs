//! Response decoding: from raw provider bytes to per-unit translations.
//!
//! Stage one finds the model's text in whichever response envelope the
//! provider used. Stage two pulls the JSON array of translations out of that
//! text, repairing the escape mistakes models commonly make along the way.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{excerpt, DecodeError};
use crate::plural::PluralTranslation;

#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateEnvelope {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct MessagesEnvelope {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponsesEnvelope {
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FlatEnvelope {
    response: String,
}

/// Extract the model's text payload from a provider response body.
pub fn extract_text(body: &[u8]) -> Result<String, DecodeError> {
    let raw = String::from_utf8_lossy(body);
    let value: Value = serde_json::from_slice(body).map_err(|_| DecodeError::UnknownEnvelope {
        excerpt: excerpt(&raw),
    })?;
    extract_text_from_value(value, &raw)
}

/// Same as [`extract_text`] for an already-parsed body.
pub fn extract_text_from_value(value: Value, raw: &str) -> Result<String, DecodeError> {
    if let Some(message) = provider_error(&value) {
        return Err(DecodeError::Provider(message));
    }

    if let Ok(chat) = ChatEnvelope::deserialize(&value) {
        if let Some(content) = chat.choices.into_iter().next().and_then(|c| c.message.content) {
            return Ok(content);
        }
    }

    if let Ok(generate) = GenerateEnvelope::deserialize(&value) {
        let text = generate.candidates.into_iter().next().and_then(|c| {
            c.content
                .parts
                .into_iter()
                .filter(|p| !p.thought)
                .find_map(|p| p.text)
        });
        if let Some(text) = text {
            return Ok(text);
        }
    }

    if let Ok(messages) = MessagesEnvelope::deserialize(&value) {
        let text = join_blocks(messages.content.iter(), "text");
        if let Some(text) = text {
            return Ok(text);
        }
    }

    if let Ok(responses) = ResponsesEnvelope::deserialize(&value) {
        let text = join_blocks(
            responses.output.iter().flat_map(|item| item.content.iter()),
            "output_text",
        );
        if let Some(text) = text {
            return Ok(text);
        }
    }

    if let Ok(flat) = FlatEnvelope::deserialize(&value) {
        return Ok(flat.response);
    }

    Err(DecodeError::UnknownEnvelope {
        excerpt: excerpt(raw),
    })
}

fn join_blocks<'a>(blocks: impl Iterator<Item = &'a ContentBlock>, kind: &str) -> Option<String> {
    let texts: Vec<&str> = blocks
        .filter(|b| b.kind == kind)
        .filter_map(|b| b.text.as_deref())
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.concat())
    }
}

/// A structured `error` field, as a message.
fn provider_error(value: &Value) -> Option<String> {
    match value.get("error")? {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Parse a flat array of translations, one per unit in order.
///
/// Extra or missing elements are tolerated; callers match by index.
pub fn parse_translations(text: &str, expected: usize) -> Result<Vec<String>, DecodeError> {
    let elements = parse_elements(text, expected)?;
    Ok(elements.into_iter().map(element_text).collect())
}

/// Parse an array whose elements are strings or arrays of plural forms.
pub fn parse_plural_translations(
    text: &str,
    expected: usize,
) -> Result<Vec<PluralTranslation>, DecodeError> {
    let elements = parse_elements(text, expected)?;
    Ok(elements
        .into_iter()
        .map(|element| match element {
            Value::Array(forms) => {
                PluralTranslation::Forms(forms.into_iter().map(element_text).collect())
            }
            other => PluralTranslation::Single(element_text(other)),
        })
        .collect())
}

fn parse_elements(text: &str, expected: usize) -> Result<Vec<Value>, DecodeError> {
    let span = array_span(text)?;
    let repaired = repair_escapes(span);
    let elements: Vec<Value> =
        serde_json::from_str(&repaired).map_err(|e| DecodeError::InvalidArray {
            reason: e.to_string(),
            excerpt: excerpt(span),
        })?;

    if elements.is_empty() {
        return Err(DecodeError::Empty { expected });
    }
    Ok(elements)
}

fn element_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        Value::Array(items) => items.into_iter().next().map(element_text).unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Remove a surrounding Markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// The outermost `[...]` span of the model output.
fn array_span(text: &str) -> Result<&str, DecodeError> {
    let body = strip_code_fence(text);
    match (body.find('['), body.rfind(']')) {
        (Some(start), Some(end)) if end > start => Ok(&body[start..=end]),
        _ => Err(DecodeError::MissingArray {
            excerpt: excerpt(text),
        }),
    }
}

/// Make string literals inside a JSON-ish array decodable.
///
/// Inside quoted strings, a backslash that does not start a valid JSON escape
/// is doubled so it survives as a literal backslash, and raw newline, carriage
/// return and tab characters are escaped. Text outside strings is untouched.
pub fn repair_escapes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\\' => match chars.get(i + 1) {
                Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => {
                    out.push(c);
                    out.push(chars[i + 1]);
                    i += 1;
                }
                Some('u') => match unicode_escape_len(&chars[i..]) {
                    Some(len) => {
                        out.extend(&chars[i..i + len]);
                        i += len - 1;
                    }
                    None => out.push_str("\\\\"),
                },
                _ => out.push_str("\\\\"),
            },
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
        i += 1;
    }
    out
}

/// Length of the valid `\uXXXX` escape (or surrogate pair) starting `text`.
///
/// Lone surrogates are rejected by the JSON decoder, so they count as invalid.
fn unicode_escape_len(text: &[char]) -> Option<usize> {
    match hex_unit(text)? {
        0xD800..=0xDBFF => match hex_unit(text.get(6..)?)? {
            0xDC00..=0xDFFF => Some(12),
            _ => None,
        },
        0xDC00..=0xDFFF => None,
        _ => Some(6),
    }
}

fn hex_unit(text: &[char]) -> Option<u32> {
    if text.len() < 6 || text[0] != '\\' || text[1] != 'u' {
        return None;
    }
    let digits = &text[2..6];
    if !digits.iter().all(char::is_ascii_hexdigit) {
        return None;
    }
    u32::from_str_radix(&digits.iter().collect::<String>(), 16).ok()
}
