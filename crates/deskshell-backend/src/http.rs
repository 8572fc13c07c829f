//! Outbound HTTP performed on the UI's behalf.

use std::time::Duration;

use deskshell_proto::{commands, HttpRequest, HttpResponse};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::BackendError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("deskshell/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self, BackendError> {
        let inner = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| BackendError::Io(format!("Failed to build http client: {err}")))?;
        Ok(Self { inner })
    }

    /// Sends `request` and collects the reply. A body that is not JSON comes
    /// back as `null`; only transport failures are errors.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, BackendError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| invalid(format!("invalid HTTP method {:?}", request.method)))?;
        let url = Url::parse(&request.url)
            .map_err(|err| invalid(format!("invalid URL {:?}: {err}", request.url)))?;

        let mut builder = self.inner.request(method, url);
        if let Some(query) = &request.query {
            builder = builder.query(query);
        }
        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|err| BackendError::Io(format!("Request failed: {err}")))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        let body = match response.json::<Value>().await {
            Ok(body) => body,
            Err(err) => {
                debug!(error = %err, "response body is not JSON");
                Value::Null
            }
        };
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn invalid(message: String) -> BackendError {
    BackendError::InvalidArgs {
        command: commands::HTTP_REQUEST.to_string(),
        message,
    }
}
