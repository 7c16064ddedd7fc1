//! Client-facing error taxonomy and server error payload parsing.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

/// Error envelope the backend uses for non-field failures.
///
/// Most endpoints answer `{"detail": "..."}`; a few older ones use `message`
/// and the auth views occasionally add a `code`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorPayload {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

/// Attempt to parse an error body into a user-facing message.
/// Prefers `detail`, falls back to `message`.
pub fn try_error_detail(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorPayload>(body).ok()?;
    [parsed.detail, parsed.message]
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
}

/// Parse a `{"field": ["msg", ...]}` validation payload.
///
/// Single string values are accepted as one-element lists. Returns `None`
/// when the body is not an object of field errors (e.g. only `detail`).
pub fn parse_field_errors(body: &str) -> Option<BTreeMap<String, Vec<String>>> {
    let Value::Object(map) = serde_json::from_str::<Value>(body).ok()? else {
        return None;
    };

    let mut fields = BTreeMap::new();
    for (key, value) in map {
        if key == "detail" || key == "message" || key == "code" {
            continue;
        }
        let messages: Vec<String> = match value {
            Value::String(s) => vec![s],
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => continue,
        };
        if !messages.is_empty() {
            fields.insert(key, messages);
        }
    }

    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// API error type for client-side use
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// 401 that survived the single refresh-and-retry attempt, or that could
    /// not be recovered because no refresh token was available.
    #[error("unauthorized")]
    Unauthorized { body: Option<String> },
    /// The refresh endpoint rejected the refresh token or could not be reached.
    #[error("session refresh failed: {reason}")]
    RefreshFailed { reason: String },
    /// Transport-level failure, including the request timeout.
    #[error("network error: {0}")]
    Network(String),
    /// Any other non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Server { status: u16, body: String },
    /// Field errors surfaced verbatim from a 400/422 payload.
    #[error("validation failed ({status}): {body}")]
    Validation {
        status: u16,
        fields: BTreeMap<String, Vec<String>>,
        body: String,
    },
    /// The response body did not match the expected shape.
    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl ApiError {
    /// Classify a non-success, non-401 response.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 400 || status == 422 {
            if let Some(fields) = parse_field_errors(&body) {
                return ApiError::Validation {
                    status,
                    fields,
                    body,
                };
            }
        }
        ApiError::Server { status, body }
    }

    /// Whether this failure means the session is gone.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::RefreshFailed { .. }
        )
    }

    /// HTTP status carried by the error, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Server { status, .. } | ApiError::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for an inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized { body } => body
                .as_deref()
                .and_then(try_error_detail)
                .unwrap_or_else(|| "Your session has expired. Please sign in again.".to_string()),
            ApiError::RefreshFailed { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ApiError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            ApiError::Server { status, body } => try_error_detail(body)
                .unwrap_or_else(|| format!("The server returned an error ({status}).")),
            ApiError::Validation { fields, body, .. } => try_error_detail(body)
                .or_else(|| {
                    fields.iter().next().and_then(|(field, messages)| {
                        messages.first().map(|msg| {
                            if field == "non_field_errors" {
                                msg.clone()
                            } else {
                                format!("{field}: {msg}")
                            }
                        })
                    })
                })
                .unwrap_or_else(|| "The request was invalid.".to_string()),
            ApiError::Deserialize(_) => "The server sent an unexpected response.".to_string(),
        }
    }
}
