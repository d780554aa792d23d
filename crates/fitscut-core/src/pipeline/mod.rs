pub mod config;
mod orchestrator;
mod types;

pub use orchestrator::{establish_reference, run_cutout, run_cutout_reported};
pub use types::{PipelineStage, ProgressReporter};
