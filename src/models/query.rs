use serde::{Deserialize, Serialize};

use super::attributes::NewUserPayload;
use crate::error::{AppError, AppResult};

/// Parameters named in the reply to an unsupported query type
pub const ALL_QUERY_PARAMETERS: [&str; 4] = ["query_type", "user_id", "page_id", "model_id"];

/// Query string of a registered-user lookup, before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawQueryParams {
    pub q_user_id: Option<String>,
    pub q_type: Option<String>,
    pub q_page_id: Option<String>,
    pub q_model_id: Option<String>,
}

/// Addressing mode over a recommendation sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Paginated,
    Range,
}

impl QueryType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PAGINATED_QUERY" => Some(QueryType::Paginated),
            "RANGE_QUERY" => Some(QueryType::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Paginated => "PAGINATED_QUERY",
            QueryType::Range => "RANGE_QUERY",
        }
    }
}

/// Inclusive block range of a range query, in 1-based pages of 100
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub start: usize,
    pub end: usize,
}

impl PageRange {
    /// Parses the `"start_end"` form
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, end) = raw.split_once('_')?;
        let start: usize = start.trim().parse().ok()?;
        let end: usize = end.trim().parse().ok()?;
        if start == 0 || end == 0 {
            return None;
        }
        Some(Self { start, end })
    }
}

/// A fully validated view request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    /// 1-based page of 10 items
    Page(usize),
    /// Blocks of 100 items, or the whole sequence
    Range(Option<PageRange>),
}

impl PageSelector {
    pub fn query_type(&self) -> QueryType {
        match self {
            PageSelector::Page(_) => QueryType::Paginated,
            PageSelector::Range(_) => QueryType::Range,
        }
    }

    /// Validates `q_type` together with the `q_page_id` it requires
    pub fn from_parts(q_type: Option<&str>, q_page_id: Option<&str>) -> AppResult<Self> {
        match q_type.and_then(QueryType::parse) {
            Some(QueryType::Paginated) => {
                let raw = q_page_id.ok_or_else(|| AppError::malformed_query(["page_id"]))?;
                match raw.trim().parse::<usize>() {
                    Ok(page) if page >= 1 => Ok(PageSelector::Page(page)),
                    _ => Err(AppError::malformed_query(["page_id"])),
                }
            }
            Some(QueryType::Range) => match q_page_id {
                None => Ok(PageSelector::Range(None)),
                Some(raw) => PageRange::parse(raw)
                    .map(|range| PageSelector::Range(Some(range)))
                    .ok_or_else(|| AppError::malformed_query(["page_id"])),
            },
            None => Err(AppError::malformed_query(ALL_QUERY_PARAMETERS)),
        }
    }
}

/// Validated registered-user lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredQuery {
    pub user_id: String,
    pub selector: PageSelector,
    /// Parsed for compatibility; lookups always resolve the latest record
    pub model_id: Option<i64>,
}

impl RawQueryParams {
    pub fn validate(&self) -> AppResult<RegisteredQuery> {
        let selector = PageSelector::from_parts(self.q_type.as_deref(), self.q_page_id.as_deref())?;

        let user_id = self
            .q_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::malformed_query(["user_id"]))?;

        let model_id = match self.q_model_id.as_deref() {
            None => None,
            Some(raw) => Some(
                raw.trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::malformed_query(["model_id"]))?,
            ),
        };

        Ok(RegisteredQuery {
            user_id: user_id.to_string(),
            selector,
            model_id,
        })
    }
}

/// JSON body of a new-user submission: attributes plus the view to return
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserSubmission {
    #[serde(flatten)]
    pub attributes: NewUserPayload,
    #[serde(default)]
    pub q_type: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub q_page_id: Option<String>,
}

/// Page ids arrive as strings in query strings but often as numbers in JSON
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Body returned for a served recommendation slice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub user_id: String,
    /// Stringified for transport
    pub model_id: String,
    pub recommendation_id: Vec<String>,
    pub message: String,
}
