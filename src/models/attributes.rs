use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;

use crate::error::{AppError, AppResult};

/// Gender category of a new user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "X")]
    NonBinary,
}

impl Gender {
    /// Parses the short code or the full word, case-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "f" | "female" => Some(Gender::Female),
            "m" | "male" => Some(Gender::Male),
            "x" | "nonbinary" | "non-binary" => Some(Gender::NonBinary),
            _ => None,
        }
    }

    /// Key used in the preference reference tables
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Female => "F",
            Gender::Male => "M",
            Gender::NonBinary => "X",
        }
    }
}

impl Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Raw new-user attributes as they arrive over the wire
///
/// Every field is optional here so that validation can report all missing
/// fields at once instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserPayload {
    #[serde(default, rename = "user_id", alias = "new_user_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub following_categories: Option<Vec<String>>,
}

/// Validated attributes of a user with no history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserAttributes {
    pub user_id: String,
    pub gender: Gender,
    pub location_id: String,
    pub birthdate: NaiveDate,
    pub followed_categories: BTreeSet<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl NewUserPayload {
    /// Checks every field and reports all offending ones together
    pub fn validate(&self) -> AppResult<NewUserAttributes> {
        let mut invalid = Vec::new();

        let user_id = non_blank(&self.user_id);
        if user_id.is_none() {
            invalid.push("user_id");
        }

        let gender = non_blank(&self.gender).and_then(Gender::parse);
        if gender.is_none() {
            invalid.push("gender");
        }

        let location_id = non_blank(&self.location_id);
        if location_id.is_none() {
            invalid.push("locationId");
        }

        let birthdate = non_blank(&self.birthdate)
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok());
        if birthdate.is_none() {
            invalid.push("birthdate");
        }

        let followed = self.following_categories.as_ref().map(|categories| {
            categories
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
        });
        if followed.is_none() {
            invalid.push("followingCategories");
        }

        match (user_id, gender, location_id, birthdate, followed) {
            (Some(user_id), Some(gender), Some(location_id), Some(birthdate), Some(followed)) => {
                Ok(NewUserAttributes {
                    user_id: user_id.to_string(),
                    gender,
                    location_id: location_id.to_string(),
                    birthdate,
                    followed_categories: followed,
                })
            }
            _ => Err(AppError::validation(invalid)),
        }
    }
}

impl NewUserAttributes {
    /// Decade of birth, e.g. "1990" for 1995-01-01
    pub fn birth_decade(&self) -> String {
        let year = self.birthdate.year();
        format!("{}", year - year.rem_euclid(10))
    }

    /// Wire payload for the inference boundary
    pub fn to_payload(&self) -> NewUserPayload {
        NewUserPayload {
            user_id: Some(self.user_id.clone()),
            gender: Some(self.gender.code().to_string()),
            location_id: Some(self.location_id.clone()),
            birthdate: Some(self.birthdate.format("%Y-%m-%d").to_string()),
            following_categories: Some(self.followed_categories.iter().cloned().collect()),
        }
    }
}
