pub mod ann;
pub mod inference;
pub mod model;
pub mod pagination;
pub mod query_router;
pub mod recommender;
pub mod retriever;
pub mod synthesizer;

pub use inference::{HttpInferenceClient, InferenceEndpoint};
pub use model::{FileReferenceSource, ModelHolder, ReferenceSource, StaticReferenceSource};
pub use query_router::{Clock, QueryOutcome, QueryRouter, SystemClock};
pub use recommender::RecommendationService;
