pub mod engine;
pub mod flatten;
pub mod service;

pub use engine::{DataMappingEngine, DataMappingEngineConfig, PathPattern};
pub use flatten::flatten;
pub use service::{MappingService, MappingValidation};
