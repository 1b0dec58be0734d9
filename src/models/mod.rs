//! Typed request, response and record structures
//!
//! Every payload that crosses a boundary gets its own struct here and is
//! validated once, at the edge, into a type the services can trust.

pub mod attributes;
pub mod query;
pub mod record;

pub use attributes::{Gender, NewUserAttributes, NewUserPayload};
pub use query::{
    NewUserSubmission, PageRange, PageSelector, QueryType, RawQueryParams, RecommendationResponse,
    RegisteredQuery, ALL_QUERY_PARAMETERS,
};
pub use record::{InvocationResponse, ItemSequence, RecommendationRecord, ITEM_DELIMITER};
