use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::collab::{
    BatchSubmitter, Catalog, CatalogClient, LocalStorage, NoCatalog, ObjectStorage, SpoolSubmitter,
};
use crate::config::Configuration;
use crate::error::ModelError;
use crate::media::{FfmpegBackend, MediaBackend};
use crate::model::{ModelLoader, ModelMetadata, ModelPackage, OnnxLoader};

/// A model ready to hand to the render workers.
pub struct LoadedModel {
    pub loader: Arc<dyn ModelLoader>,
    pub metadata: Option<ModelMetadata>,
    // Keeps an unpacked archive alive while workers load from it.
    _package: Option<ModelPackage>,
}

impl LoadedModel {
    pub fn new(loader: Arc<dyn ModelLoader>, metadata: Option<ModelMetadata>) -> Self {
        Self {
            loader,
            metadata,
            _package: None,
        }
    }
}

/// Turns a downloaded model path into a loader.
pub trait ModelProvider: Send + Sync {
    fn open(&self, path: &Path) -> Result<LoadedModel, ModelError>;
}

#[derive(Debug, Clone, Default)]
pub struct OnnxModels;

impl ModelProvider for OnnxModels {
    fn open(&self, path: &Path) -> Result<LoadedModel, ModelError> {
        let package = ModelPackage::open(path)?;
        Ok(LoadedModel {
            loader: Arc::new(OnnxLoader::from_package(&package)),
            metadata: Some(package.metadata.clone()),
            _package: Some(package),
        })
    }
}

/// Everything a batch run talks to, passed explicitly.
#[derive(Clone)]
pub struct BatchContext {
    pub storage: Arc<dyn ObjectStorage>,
    pub catalog: Arc<dyn Catalog>,
    pub submitter: Arc<dyn BatchSubmitter>,
    pub media: Arc<dyn MediaBackend>,
    pub models: Arc<dyn ModelProvider>,
    pub configuration: Configuration,
}

impl BatchContext {
    /// Local storage, HTTP catalog (when an endpoint is set), spool submitter and ffmpeg.
    pub fn from_configuration(configuration: Configuration) -> Self {
        let batch = &configuration.batch;
        let catalog: Arc<dyn Catalog> = match &batch.catalog_endpoint {
            Some(endpoint) => Arc::new(CatalogClient::http(
                endpoint.clone(),
                batch.catalog_api_key.clone(),
                Duration::from_secs(batch.catalog_timeout_secs.max(1)),
            )),
            None => Arc::new(NoCatalog),
        };

        Self {
            storage: Arc::new(LocalStorage::new(batch.storage_root.clone())),
            catalog,
            submitter: Arc::new(SpoolSubmitter::new(batch.spool_dir.clone())),
            media: Arc::new(FfmpegBackend::default()),
            models: Arc::new(OnnxModels),
            configuration,
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn ObjectStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_media(mut self, media: Arc<dyn MediaBackend>) -> Self {
        self.media = media;
        self
    }

    pub fn with_models(mut self, models: Arc<dyn ModelProvider>) -> Self {
        self.models = models;
        self
    }
}
