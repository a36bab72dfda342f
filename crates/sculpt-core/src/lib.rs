//! # sculpt-core
//!
//! Core types for the sculpt text-to-geometry pipeline.
//!
//! A prompt becomes a shape descriptor, the descriptor becomes a CadQuery
//! script, and the script is checked, critiqued, healed and executed. This
//! crate holds the record threaded through one run, the uniform phase result,
//! structured defects, configuration, and the traits behind which every
//! external collaborator sits.

pub mod config;
pub mod defect;
mod degrade;
mod error;
pub mod traits;
mod types;

pub use config::{
    ExecutorConfig, HealingConfig, OracleConfig, OracleModels, PipelineConfig, SculptConfig,
};
pub use defect::{Defect, DefectKind, Issue};
pub use error::{Result, SculptError};
pub use degrade::with_fallback;
pub use traits::{
    Analyst, Architect, Executor, OracleRequest, Planner, Synthesizer, TemplateGenerator,
    TextOracle,
};
pub use types::*;
