//! Session-token exchange against the auth service.

use serde::Deserialize;

use crate::http_client;

const MAX_LOGIN_RESPONSE_BYTES: usize = 64 * 1024;

/// The token could not be exchanged for a user identity.
#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error("No auth token supplied; set KB_AUTH_TOKEN")]
    MissingToken,
    #[error("Auth service rejected the token (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
    #[error("HTTP error: {0}")]
    Transport(String),
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    user_id: Option<String>,
}

/// Exchange `token` for the user id it belongs to.
pub fn login(auth_url: &str, token: &str) -> Result<String, AuthenticationError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthenticationError::MissingToken);
    }
    let request = http_client::agent()
        .post(auth_url)
        .set("Accept", "application/json");
    let response = match request.send_form(&[("token", token), ("fields", "user_id")]) {
        Ok(response) => response,
        Err(ureq::Error::Status(status, response)) => {
            return Err(AuthenticationError::Rejected {
                status,
                body: super::read_error_body(response),
            });
        }
        Err(ureq::Error::Transport(err)) => {
            return Err(AuthenticationError::Transport(err.to_string()));
        }
    };
    let body = http_client::read_response_text(response, MAX_LOGIN_RESPONSE_BYTES)
        .map_err(|err| AuthenticationError::InvalidResponse(err.to_string()))?;
    parse_user_id(&body)
}

fn parse_user_id(body: &str) -> Result<String, AuthenticationError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(AuthenticationError::InvalidResponse(
            "Empty response body".to_string(),
        ));
    }
    let parsed: LoginResponse = serde_json::from_str(trimmed)
        .map_err(|err| AuthenticationError::InvalidResponse(format!("{err}: {trimmed}")))?;
    parsed
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AuthenticationError::InvalidResponse("Missing user_id".to_string()))
}
