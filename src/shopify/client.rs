use crate::config::ShopConfig;
use crate::http::build_client;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum ShopifyError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("throttled by the admin api")]
    Throttled,
    #[error("graphql error: {0}")]
    GraphQl(String),
    #[error("unexpected response shape: {0}")]
    Shape(String),
    #[error("rejected: {}", join_user_errors(.0))]
    UserErrors(Vec<UserError>),
}

/// Field-level validation error reported by a mutation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.field, &self.code) {
            (Some(field), Some(code)) => {
                write!(f, "{} ({}, {code})", self.message, field.join("."))
            }
            (Some(field), None) => write!(f, "{} ({})", self.message, field.join(".")),
            (None, Some(code)) => write!(f, "{} ({code})", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

fn join_user_errors(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphQlErrorExtensions>,
}

#[derive(Deserialize)]
struct GraphQlErrorExtensions {
    #[serde(default)]
    code: Option<String>,
}

/// Admin GraphQL client bound to one store and API version.
#[derive(Debug, Clone)]
pub struct ShopifyClient {
    http: Client,
    endpoint: String,
    access_token: String,
    pub(crate) reference_document_uri: Option<String>,
}

impl ShopifyClient {
    pub fn new(config: &ShopConfig) -> Self {
        Self {
            http: build_client(&config.http),
            endpoint: config.graphql_url(),
            access_token: config.access_token.clone(),
            reference_document_uri: None,
        }
    }

    /// Tags inventory changes with a reference shown in the admin's
    /// adjustment history.
    pub fn with_reference_document(mut self, uri: impl Into<String>) -> Self {
        self.reference_document_uri = Some(uri.into());
        self
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Posts one GraphQL document and returns its `data` object.
    pub(crate) async fn execute(&self, query: &str, variables: Value) -> Result<Value, ShopifyError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&GraphQlRequest { query, variables })
            .send()
            .await
            .map_err(|err| ShopifyError::Request(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ShopifyError::Throttled);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopifyError::Http {
                status: status.as_u16(),
                body: truncate(&body, ERROR_BODY_LIMIT),
            });
        }

        let payload: GraphQlResponse = response
            .json()
            .await
            .map_err(|err| ShopifyError::Shape(err.to_string()))?;
        let data = check_response(payload)?;
        debug!(target: "stocksync.shopify", endpoint = %self.endpoint, "graphql ok");
        Ok(data)
    }
}

fn check_response(payload: GraphQlResponse) -> Result<Value, ShopifyError> {
    if payload.errors.iter().any(|err| {
        err.extensions
            .as_ref()
            .and_then(|ext| ext.code.as_deref())
            .is_some_and(|code| code == "THROTTLED")
    }) {
        return Err(ShopifyError::Throttled);
    }
    if !payload.errors.is_empty() {
        let messages = payload
            .errors
            .into_iter()
            .map(|err| err.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ShopifyError::GraphQl(messages));
    }
    match payload.data {
        Some(Value::Null) | None => Err(ShopifyError::Shape("response has no data".into())),
        Some(data) => Ok(data),
    }
}

fn truncate(body: &str, limit: usize) -> String {
    match body.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}…", &body[..idx]),
        None => body.to_string(),
    }
}
