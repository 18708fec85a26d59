//! Error types for the remote weather providers.

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider rate limit hit (HTTP {status}): {reason}")]
    RateLimited { status: u16, reason: String },
    #[error("provider returned HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to parse provider response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Longest error body kept on a [`ProviderError::Status`].
const MAX_BODY_LEN: usize = 256;

impl ProviderError {
    /// Classify a non-2xx response.
    ///
    /// HTTP 429 is always a rate limit. Some providers answer 400 with a JSON
    /// `reason` mentioning a request limit instead, which is treated the same.
    pub fn from_response(status: StatusCode, url: &str, body: &str) -> Self {
        let reason = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("reason").and_then(|r| r.as_str()).map(str::to_owned));

        let mentions_limit = reason.as_deref().is_some_and(|r| {
            let r = r.to_ascii_lowercase();
            r.contains("limit exceeded") || r.contains("too many requests")
        });

        if status == StatusCode::TOO_MANY_REQUESTS || mentions_limit {
            return Self::RateLimited {
                status: status.as_u16(),
                reason: reason.unwrap_or_else(|| "too many requests".to_string()),
            };
        }

        let mut body = reason.unwrap_or_else(|| body.trim().to_string());
        if body.len() > MAX_BODY_LEN {
            let mut cut = MAX_BODY_LEN;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
            body.push('…');
        }

        Self::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the failure looks temporary on the provider's side.
    ///
    /// Rate limits, transport failures, 5xx and 408 are transient; malformed
    /// responses and other 4xx answers are not. Only the log level depends on it.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 408,
            Self::ParseFailed { .. } => false,
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimited { status, .. } | Self::Status { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::ParseFailed { .. } => None,
        }
    }
}
