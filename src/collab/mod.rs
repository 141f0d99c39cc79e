//! Collaborator seams of the batch orchestrator and their shipped implementations.

pub mod catalog;
pub mod storage;
pub mod submit;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Catalog, CatalogClient, GraphqlService, Mutation, NoCatalog};
pub use storage::{LocalStorage, ObjectStorage};
pub use submit::{BatchSubmitter, SpoolSubmitter};
