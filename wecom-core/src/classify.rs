//! Response classification.
//!
//! Every WeCom endpoint answers with a JSON object that carries `errcode` and
//! `errmsg` next to its payload. [`classify`] turns a transport outcome into
//! the decoded payload or an [`ApiError`]:
//!
//! | outcome                                    | result                        |
//! |--------------------------------------------|-------------------------------|
//! | transport error                            | [`ApiError::Transport`]       |
//! | JSON with non-zero `errcode` (any status)  | [`ApiError::Remote`]          |
//! | non-2xx without `errcode`                  | [`ApiError::UnexpectedStatus`] |
//! | 2xx, body not JSON or not the target type  | [`ApiError::Decode`]          |
//! | 2xx, `errcode` absent or zero              | decoded body                  |

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ApiError;
use crate::transport::{HttpResponse, TransportError};

const BODY_PREVIEW_LIMIT: usize = 512;

/// The error envelope shared by all endpoints.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    errcode: Option<i64>,
    #[serde(default)]
    errmsg: Option<String>,
}

/// Classify a completed (or failed) request.
pub fn classify<T: DeserializeOwned>(
    outcome: Result<HttpResponse, TransportError>,
) -> Result<T, ApiError> {
    let response = outcome?;
    let status = response.status;

    let value: serde_json::Value = match serde_json::from_slice(&response.body) {
        Ok(value) => value,
        Err(source) if status.is_success() => return Err(ApiError::Decode { status, source }),
        Err(_) => {
            return Err(ApiError::UnexpectedStatus {
                status,
                body: preview(&response.body),
            });
        }
    };

    if let Ok(envelope) = Envelope::deserialize(&value) {
        if let Some(code) = envelope.errcode.filter(|code| *code != 0) {
            return Err(ApiError::Remote {
                code,
                message: envelope.errmsg.unwrap_or_default(),
            });
        }
    }

    if !status.is_success() {
        return Err(ApiError::UnexpectedStatus {
            status,
            body: preview(&response.body),
        });
    }

    serde_json::from_value(value).map_err(|source| ApiError::Decode { status, source })
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    match text.char_indices().nth(BODY_PREVIEW_LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.into_owned(),
    }
}
