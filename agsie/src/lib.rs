pub mod analysis;
pub mod collect;
pub mod commons;
pub mod error;
pub mod geo_core;
pub mod geometric;

pub use analysis::orchestrator::{AnalysisFailure, AnalysisOrchestrator, AnalysisReport, AnalysisStage};
pub use error::{AnalysisError, FailureKind};
