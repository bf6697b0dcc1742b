#![doc = include_str!("../README.md")]

pub mod config;
pub mod docker;
pub mod enforcement;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod translate;

pub use config::OrchestratorOptions;
pub use docker::{BollardEngineClient, ContainerStartEvent, EngineClient};
pub use enforcement::{AllowlistMonitor, EnforcementState};
pub use error::OrchestratorError;
pub use model::{
    ContainerConfiguration, ContainerInstanceDescriptor, ContainerState, ImageConfiguration,
    ImageInstanceDescriptor, PortMapping, RegistryCredentials,
};
pub use orchestrator::{
    BollardConnector, ContainerOrchestrator, EngineConnector, ListenerId, OrchestrationListener,
};
