//! JSON decoding for provider responses with path-aware error messages.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Characters of the offending line shown on each side of the error column.
const SNIPPET_RADIUS: usize = 24;

/// Decode `body`, reporting the JSON path, position and surrounding text on failure.
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());

        let msg = inner.to_string();
        let msg = msg
            .strip_suffix(&format!(" at line {line} column {column}"))
            .unwrap_or(&msg)
            .to_string();

        let location = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!("at '{path}': ")
        };
        anyhow::anyhow!(
            "{location}{msg} (line {line} col {column}) near `{}`",
            snippet(body, line, column)
        )
    })
}

fn snippet(body: &str, line: usize, column: usize) -> String {
    let Some(text) = body.lines().nth(line.saturating_sub(1)) else {
        return String::new();
    };
    let chars: Vec<char> = text.chars().collect();
    let at = column.saturating_sub(1).min(chars.len());
    let start = at.saturating_sub(SNIPPET_RADIUS);
    let end = (at + SNIPPET_RADIUS).min(chars.len());
    chars[start..end].iter().collect()
}
