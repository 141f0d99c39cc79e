use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::catalog::Catalog;

/// Records every mutation and answers with a fixed response.
#[derive(Default)]
pub(crate) struct RecordingCatalog {
    pub calls: Mutex<Vec<(String, Value)>>,
    pub response: Option<Value>,
}

#[async_trait]
impl Catalog for RecordingCatalog {
    async fn send_mutation(&self, query: &str, variables: Value) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), variables));
        self.response.clone()
    }
}
