//! CI units: configuration, discovery and registry generation.

pub mod config;
pub mod registered;
pub mod registration;

pub use config::{
    CIUnitConfig, CIUnitTrigger, DynamicGitLabPipeline, GitLabPipeline, GitLabProviderConfig,
    ProviderConfig, StaticGitLabPipeline,
};
pub use registered::{discover_units, CIUnit, RegisteredCIUnit};
pub use registration::unit_registration;
