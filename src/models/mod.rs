pub mod endpoint;
pub mod entities;
pub mod plan;
pub mod result;

pub use endpoint::{CachePolicy, EndpointDescriptor, Freshness};
pub use entities::{
    EntityMention, ExtractedEntities, Language, QuestionType, Slot, StructuredContext,
    ValidationResult,
};
pub use plan::{EndpointCall, ExecutionPlan, ParamValue, PlanningError, PresatisfiedEntry};
pub use result::{
    CallResult, ClarificationRequest, EvidenceBundle, ExecutionResult, PipelineResponse,
    PipelineStats,
};
