use deskshell_proto::{commands, HttpRequest, HttpResponse};
use serde_json::json;

use crate::client::CommandClient;
use crate::error::CommandError;

/// Uncached one-shot commands.
#[derive(Clone)]
pub struct System {
    client: CommandClient,
}

impl System {
    pub fn new(client: CommandClient) -> Self {
        Self { client }
    }

    pub async fn check_db_health(&self) -> Result<String, CommandError> {
        self.client.invoke(commands::CHECK_DB_HEALTH, ()).await
    }

    pub async fn open_log_folder(&self) -> Result<(), CommandError> {
        self.client.invoke(commands::OPEN_LOG_FOLDER, ()).await
    }

    pub async fn greet(&self, name: &str) -> Result<String, CommandError> {
        self.client.invoke(commands::GREET, json!({ "name": name })).await
    }

    /// Performs an HTTP request from the backend process.
    pub async fn http_request(&self, request: HttpRequest) -> Result<HttpResponse, CommandError> {
        self.client
            .invoke(commands::HTTP_REQUEST, json!({ "request": request }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    #[tokio::test]
    async fn passes_results_through() {
        let transport = ScriptedTransport::new();
        let system = System::new(CommandClient::new(transport.clone()));

        assert_eq!(system.greet("Ada").await.unwrap(), "Hello, Ada!");
        assert!(system.check_db_health().await.unwrap().contains("healthy"));
        system.open_log_folder().await.unwrap();
        system.open_log_folder().await.unwrap();
        assert_eq!(transport.invocations(commands::OPEN_LOG_FOLDER), 2);
    }

    #[tokio::test]
    async fn http_request_is_wrapped_under_request() {
        let transport = ScriptedTransport::new();
        let system = System::new(CommandClient::new(transport.clone()));
        let mut request = HttpRequest::get("http://localhost:8080/status");
        request.method = "PUT".into();
        request.query = Some([("page".to_string(), "2".to_string())].into());

        let response = system.http_request(request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.headers["x-echo-method"], "PUT");
        assert_eq!(
            response.body,
            json!({"url": "http://localhost:8080/status", "query": {"page": "2"}})
        );
    }
}
