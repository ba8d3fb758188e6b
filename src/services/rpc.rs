//! JSON-RPC 1.1 transport shared by the workspace, handle, staging and QUAST clients.
//!
//! Requests carry the raw token in `Authorization`; results arrive as a JSON
//! array with one element per declared return value. Errors come back as an
//! `error` object, usually alongside HTTP 500.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::http_client;

use super::{ServiceError, map_ureq_error, read_error_body};

const MAX_RPC_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub(crate) struct RpcClient {
    url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct RpcRequest<'a, P> {
    version: &'static str,
    method: &'a str,
    params: &'a P,
    id: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponseWire {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorWire>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorWire {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl RpcClient {
    pub(crate) fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    /// Call `method` and decode the result array into `R`.
    ///
    /// `params` must serialize to a JSON array (a tuple or slice); `R` is
    /// usually a one-element tuple matching the method's single return value.
    pub(crate) fn call<P, R>(&self, method: &str, params: &P) -> Result<R, ServiceError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let result = self.call_raw(method, params)?.ok_or_else(|| {
            ServiceError::InvalidResponse {
                url: self.url.clone(),
                message: format!("{method} returned no result"),
            }
        })?;
        serde_json::from_value(result).map_err(|err| ServiceError::InvalidResponse {
            url: self.url.clone(),
            message: format!("{method} result: {err}"),
        })
    }

    /// Call a method whose result is ignored.
    pub(crate) fn call_unit<P: Serialize>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<(), ServiceError> {
        self.call_raw(method, params).map(|_| ())
    }

    fn call_raw<P: Serialize>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<Option<Value>, ServiceError> {
        let request = RpcRequest {
            version: "1.1",
            method,
            params,
            id: uuid::Uuid::new_v4().simple().to_string(),
        };
        tracing::debug!(url = %self.url, method, "JSON-RPC call");
        let mut req = http_client::agent()
            .post(&self.url)
            .set("Accept", "application/json");
        if let Some(token) = &self.token {
            req = req.set("Authorization", token);
        }

        let body = match req.send_json(&request) {
            Ok(response) => http_client::read_response_text(response, MAX_RPC_RESPONSE_BYTES)?,
            Err(ureq::Error::Status(status, response)) => {
                let body = read_error_body(response);
                return Err(match parse_rpc_error(method, &body) {
                    Some(err) => err,
                    None => ServiceError::Status {
                        url: self.url.clone(),
                        status,
                        body,
                    },
                });
            }
            Err(err) => return Err(map_ureq_error(&self.url, err)),
        };

        let wire: RpcResponseWire =
            serde_json::from_str(body.trim()).map_err(|err| ServiceError::InvalidResponse {
                url: self.url.clone(),
                message: format!("{method}: {err}"),
            })?;
        if let Some(error) = wire.error {
            return Err(rpc_error(method, error));
        }
        Ok(wire.result)
    }
}

fn parse_rpc_error(method: &str, body: &str) -> Option<ServiceError> {
    let wire: RpcResponseWire = serde_json::from_str(body).ok()?;
    wire.error.map(|error| rpc_error(method, error))
}

fn rpc_error(method: &str, error: RpcErrorWire) -> ServiceError {
    ServiceError::Rpc {
        method: method.to_string(),
        name: error.name.unwrap_or_else(|| "JSONRPCError".to_string()),
        code: error.code.unwrap_or(-32500),
        message: error
            .message
            .map(|message| message.trim().to_string())
            .unwrap_or_else(|| "no message".to_string()),
    }
}
