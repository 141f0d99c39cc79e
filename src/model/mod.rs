pub mod attention;
pub mod metadata;
pub mod observation;
pub mod package;
pub mod policy;

#[cfg(test)]
pub(crate) mod testing;

pub use attention::{occlusion_map, Attention};
pub use metadata::ModelMetadata;
pub use observation::{InputShape, Observation};
pub use package::ModelPackage;
pub use policy::{ModelLoader, OnnxLoader, PolicyModel};
