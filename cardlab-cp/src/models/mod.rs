//! Data model for the card processing pipeline.

mod card;
mod options;
mod plan;
mod results;

pub use card::CardPair;
pub use options::ProcessingOptions;
pub use plan::{StepDescriptor, StepName, StepPlan};
pub use results::{
    BatchOutcome, BatchSummary, CardMatch, GradeRecord, Identification, ListingDescription,
    PairResult, SideOutputs, SideResult,
};
