use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Separator used when an item sequence crosses a storage or transport boundary
pub const ITEM_DELIMITER: char = ',';

/// Seconds in a day, for turning the retrain interval into a TTL
const SECONDS_PER_DAY: i64 = 24 * 3600;

/// Ordered item identifiers in rank order
///
/// Internally a real sequence; serialized as a single comma-delimited string so
/// the stored and transported layout stays `"id1,id2,id3"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemSequence(Vec<String>);

impl ItemSequence {
    pub fn new(items: Vec<String>) -> Self {
        Self(items)
    }

    /// Splits a delimited string. The empty string is the empty sequence.
    pub fn decode(raw: &str) -> Self {
        if raw.is_empty() {
            return Self(Vec::new());
        }
        Self(raw.split(ITEM_DELIMITER).map(str::to_string).collect())
    }

    pub fn encode(&self) -> String {
        self.0.join(&ITEM_DELIMITER.to_string())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for ItemSequence {
    fn from(items: Vec<String>) -> Self {
        Self(items)
    }
}

impl Serialize for ItemSequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for ItemSequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::decode(&raw))
    }
}

/// The unit stored in the recommendation cache
///
/// Records are immutable: a refresh writes a new record with a newer `model_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub user_id: String,
    /// Epoch seconds of the computation that produced this record
    pub model_id: i64,
    pub recommendation_id: ItemSequence,
    /// Epoch seconds after which the store reclaims the record
    pub expiry_time: i64,
}

impl RecommendationRecord {
    /// Builds a record that stays valid for two retraining cycles
    pub fn fresh(
        user_id: String,
        items: ItemSequence,
        now: i64,
        retrain_interval_days: u32,
    ) -> Self {
        let ttl_days = i64::from(retrain_interval_days) * 2;
        Self {
            user_id,
            model_id: now,
            recommendation_id: items,
            expiry_time: now + ttl_days * SECONDS_PER_DAY,
        }
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expiry_time
    }
}

/// Response of the inference boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationResponse {
    pub user_id: String,
    pub recommendation_id: ItemSequence,
    /// Segment that produced each item. Internal; never persisted.
    #[serde(default)]
    pub index: Vec<String>,
}
