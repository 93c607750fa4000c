//! Warden Pipeline - ordered request interception steps
//!
//! Modules contribute named steps to two interception stages. This crate
//! computes where Warden's own steps belong relative to the steps of modules
//! that are already active, and inserts them exactly once at startup.

pub mod facility;
pub mod inserter;
pub mod interceptor;
pub mod ordering;
pub mod step;

pub use facility::{DirectListeners, PipelineFacility, RequestPipeline};
pub use inserter::{InsertionReport, PipelineInserter, PipelineStatus};
pub use interceptor::{
    stage_descriptor, stage_handler, BlockPredicate, RequestInterceptor, TabActivity, TabSummary,
};
pub use ordering::{own_step_name, plan, predecessors, OrderingPlan, StepRegistration, KNOWN_STEPS, OWNER};
pub use step::{BlockingResponse, ExecutionMode, RequestState, Stage, StepDescriptor, StepHandler};
