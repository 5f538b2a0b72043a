use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Content type used by the Confluent schema registry REST API.
const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("invalid schema registry url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("schema registry request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("schema registry returned {status} for subject {subject}")]
    UnexpectedStatus { subject: String, status: StatusCode },
}

/// The latest registered version of a subject's schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredSchema {
    pub id: u32,
    #[serde(default)]
    pub version: i32,
    pub schema: String,
}

/// Registry subject holding the value schema of a topic.
pub fn value_subject(topic: &str) -> String {
    format!("{topic}-value")
}

/// Resolves a topic name to the schema its values are written with.
#[async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn get_latest_schema(&self, topic: &str) -> Result<RegisteredSchema, RegistryError>;
}

/// Client for the Confluent schema registry REST API.
pub struct HttpSchemaRegistry {
    base_url: Url,
    basic_auth: Option<(String, String)>,
    client: reqwest::Client,
}

impl HttpSchemaRegistry {
    pub fn new(
        base_url: &str,
        basic_auth: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        // Url::join drops the last path segment unless it ends with a slash.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        let basic_auth = basic_auth.map(|credentials| match credentials.split_once(':') {
            Some((user, password)) => (user.to_owned(), password.to_owned()),
            None => (credentials.to_owned(), String::new()),
        });

        let client = reqwest::Client::builder()
            .user_agent("user-classifier")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url,
            basic_auth,
            client,
        })
    }
}

#[async_trait]
impl SchemaRegistry for HttpSchemaRegistry {
    async fn get_latest_schema(&self, topic: &str) -> Result<RegisteredSchema, RegistryError> {
        let subject = value_subject(topic);
        let url = self
            .base_url
            .join(&format!("subjects/{subject}/versions/latest"))?;
        debug!("fetching latest schema for {} from {}", subject, url);

        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, REGISTRY_CONTENT_TYPE);
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::UnexpectedStatus { subject, status });
        }

        Ok(response.json::<RegisteredSchema>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const SCHEMA: &str = r#"{"type":"record","name":"User","fields":[{"name":"user_id","type":"string"}]}"#;

    fn registry(server: &MockServer, auth: Option<&str>) -> HttpSchemaRegistry {
        HttpSchemaRegistry::new(&server.base_url(), auth, Duration::from_secs(5))
            .expect("failed to build registry client")
    }

    #[tokio::test]
    async fn fetches_latest_value_schema() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/subjects/transactions_aggregate-value/versions/latest");
            then.status(200)
                .header("content-type", REGISTRY_CONTENT_TYPE)
                .json_body(serde_json::json!({
                    "subject": "transactions_aggregate-value",
                    "version": 3,
                    "id": 7,
                    "schema": SCHEMA,
                }));
        });

        let schema = registry(&server, None)
            .get_latest_schema("transactions_aggregate")
            .await
            .expect("failed to fetch schema");

        mock.assert();
        assert_eq!(schema.id, 7);
        assert_eq!(schema.version, 3);
        assert_eq!(schema.schema, SCHEMA);
    }

    #[tokio::test]
    async fn sends_basic_auth_when_configured() {
        let server = MockServer::start();
        // "user:secret" base64 encoded
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/subjects/user_labeling-value/versions/latest")
                .header("authorization", "Basic dXNlcjpzZWNyZXQ=");
            then.status(200)
                .json_body(serde_json::json!({ "id": 1, "schema": SCHEMA }));
        });

        let schema = registry(&server, Some("user:secret"))
            .get_latest_schema("user_labeling")
            .await
            .expect("failed to fetch schema");

        mock.assert();
        assert_eq!(schema.id, 1);
    }

    #[tokio::test]
    async fn missing_subject_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET);
            then.status(404).json_body(serde_json::json!({
                "error_code": 40401,
                "message": "Subject not found.",
            }));
        });

        match registry(&server, None).get_latest_schema("unknown").await {
            Err(RegistryError::UnexpectedStatus { subject, status }) => {
                assert_eq!(subject, "unknown-value");
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("expected an unexpected status error, got {:?}", other),
        }
    }

    #[test]
    fn base_url_with_path_is_preserved() {
        let registry = HttpSchemaRegistry::new(
            "http://registry.local/confluent",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            registry.base_url.as_str(),
            "http://registry.local/confluent/"
        );
    }
}
