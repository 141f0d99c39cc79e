use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tower::timeout::{Timeout, TimeoutLayer};
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::error::CatalogError;

const API_KEY_HEADER: &str = "x-api-key";

/// Registration side of the asset catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Fire-and-forget: failures are logged and come back as `None`.
    async fn send_mutation(&self, query: &str, variables: Value) -> Option<Value>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Mutation {
    pub query: String,
    pub variables: Value,
}

/// GraphQL-over-HTTP transport. Responds with the `data` member.
#[derive(Debug, Clone)]
pub struct GraphqlService {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl GraphqlService {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

impl Service<Mutation> for GraphqlService {
    type Response = Value;
    type Error = CatalogError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mutation: Mutation) -> Self::Future {
        let mut request = self.client.post(&self.endpoint).json(&mutation);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        Box::pin(async move {
            let body: Value = request.send().await?.error_for_status()?.json().await?;
            if let Some(errors) = body
                .get("errors")
                .filter(|e| e.as_array().is_some_and(|a| !a.is_empty()))
            {
                return Err(CatalogError::Rejected(errors.to_string()));
            }
            Ok(body.get("data").cloned().unwrap_or(Value::Null))
        })
    }
}

/// [`Catalog`] over any mutation service; HTTP behind a timeout by default.
#[derive(Clone)]
pub struct CatalogClient<S = Timeout<GraphqlService>> {
    service: S,
}

impl CatalogClient {
    pub fn http(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self::with_service(TimeoutLayer::new(timeout).layer(GraphqlService::new(endpoint, api_key)))
    }
}

impl<S> CatalogClient<S> {
    pub fn with_service(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> Catalog for CatalogClient<S>
where
    S: Service<Mutation, Response = Value> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn send_mutation(&self, query: &str, variables: Value) -> Option<Value> {
        let mutation = Mutation {
            query: query.to_string(),
            variables,
        };
        match self.service.clone().oneshot(mutation).await {
            Ok(Value::Null) => {
                tracing::warn!("Catalog mutation returned no data");
                None
            }
            Ok(data) => Some(data),
            Err(e) => {
                let e: BoxError = e.into();
                tracing::warn!("Catalog mutation failed: {}", e);
                None
            }
        }
    }
}

/// Used when no catalog endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct NoCatalog;

#[async_trait]
impl Catalog for NoCatalog {
    async fn send_mutation(&self, _query: &str, _variables: Value) -> Option<Value> {
        tracing::debug!("No catalog configured, skipping mutation");
        None
    }
}
