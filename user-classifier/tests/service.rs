use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use envconfig::Envconfig;
use reqwest::StatusCode;

use classifier_common::schema_registry::{RegisteredSchema, RegistryError, SchemaRegistry};
use user_classifier::config::Config;
use user_classifier::error::StartupError;
use user_classifier::service::build_pipeline;

/// Serves fixed schemas per topic and remembers which topics were asked for.
struct StaticRegistry {
    schemas: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StaticRegistry {
    fn new(schemas: &[(&str, &str)]) -> Self {
        Self {
            schemas: schemas
                .iter()
                .map(|(topic, schema)| (topic.to_string(), schema.to_string()))
                .collect(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SchemaRegistry for StaticRegistry {
    async fn get_latest_schema(&self, topic: &str) -> Result<RegisteredSchema, RegistryError> {
        self.requested.lock().unwrap().push(topic.to_string());
        match self.schemas.get(topic) {
            Some(schema) => Ok(RegisteredSchema {
                id: 1,
                version: 1,
                schema: schema.clone(),
            }),
            None => Err(RegistryError::UnexpectedStatus {
                subject: format!("{topic}-value"),
                status: StatusCode::NOT_FOUND,
            }),
        }
    }
}

fn config() -> Config {
    Config::init_from_hashmap(&HashMap::new()).expect("default configuration is valid")
}

#[tokio::test]
async fn unknown_input_subject_stops_startup() {
    let registry = StaticRegistry::new(&[]);

    match build_pipeline(&config(), &registry).await {
        Err(StartupError::Registry(RegistryError::UnexpectedStatus { subject, .. })) => {
            assert_eq!(subject, "transactions_aggregate-value")
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("startup should have failed"),
    }
    assert_eq!(
        *registry.requested.lock().unwrap(),
        vec!["transactions_aggregate".to_string()]
    );
}

#[tokio::test]
async fn output_schema_is_resolved_for_the_labeling_topic() {
    let registry = StaticRegistry::new(&[("transactions_aggregate", r#""string""#)]);

    match build_pipeline(&config(), &registry).await {
        Err(StartupError::Registry(RegistryError::UnexpectedStatus { subject, .. })) => {
            assert_eq!(subject, "user_labeling-value")
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("startup should have failed"),
    }
}

#[tokio::test]
async fn unparseable_schema_stops_startup() {
    let registry = StaticRegistry::new(&[
        ("transactions_aggregate", r#"{"type": "recrod"}"#),
        ("user_labeling", r#""string""#),
    ]);

    match build_pipeline(&config(), &registry).await {
        Err(StartupError::Schema(_)) => {}
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("startup should have failed"),
    }
}
