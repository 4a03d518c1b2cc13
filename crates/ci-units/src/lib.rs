pub mod check;
pub mod error;
pub mod layout;
pub mod merge;
pub mod pipeline;
pub mod unit;
pub mod yaml;

pub use check::{CheckReport, Checker, Finding, FindingKind};
pub use error::{CiUnitsError, Result};
pub use layout::Layout;
pub use merge::{deep_merge, merge_mappings};
pub use pipeline::{PipelineLoader, TriggeredConfigurations};
pub use unit::{discover_units, unit_registration, CIUnit, CIUnitConfig, RegisteredCIUnit};
pub use yaml::{dump_yaml, load_yaml, parse_yaml, GitLabReference};
