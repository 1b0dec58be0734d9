use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;

use crate::{
    error::{AppError, AppResult},
    models::ITEM_DELIMITER,
    services::ann::{AnnIndex, IndexParams},
};

const PREFERENCES_FILE: &str = "preferences.json";
const PROFILES_FILE: &str = "profiles.json";
const SEGMENTS_FILE: &str = "segments.json";

fn unit_weight() -> f32 {
    1.0
}

/// Reference vectors used to infer preferences of users with no history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceReference {
    pub dimension: usize,
    #[serde(default = "unit_weight")]
    pub demographic_weight: f32,
    #[serde(default = "unit_weight")]
    pub interest_weight: f32,
    #[serde(default)]
    pub gender: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub birth_decade: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub location: HashMap<String, Vec<f32>>,
    #[serde(default)]
    pub category: HashMap<String, Vec<f32>>,
}

/// Row of the user profile table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Items already actioned by this user
    #[serde(default)]
    pub excluded: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedItem {
    pub id: String,
    pub vector: Vec<f32>,
}

/// Items of one category segment, before indexing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    pub items: Vec<IndexedItem>,
}

/// Everything read from durable storage, as stored
#[derive(Debug, Clone)]
pub struct ReferenceBundle {
    pub preferences: PreferenceReference,
    pub profiles: HashMap<String, UserProfile>,
    /// Priority order; the first segment is the default
    pub segments: Vec<SegmentSpec>,
}

/// A category segment with its similarity index
pub struct Segment {
    pub name: String,
    pub categories: BTreeSet<String>,
    pub index: AnnIndex,
}

/// Read-only serving state shared by every request once loaded
pub struct ReferenceData {
    pub preferences: PreferenceReference,
    profiles: HashMap<String, UserProfile>,
    segments: Vec<Segment>,
}

impl ReferenceData {
    /// Validates the bundle and builds one index per segment
    pub fn build(bundle: ReferenceBundle, params: IndexParams) -> AppResult<Self> {
        let ReferenceBundle {
            preferences,
            profiles,
            segments: specs,
        } = bundle;
        let dimension = preferences.dimension;

        if specs.is_empty() {
            return Err(AppError::ModelLoad("At least one segment is required".to_string()));
        }

        let tables = [
            ("gender", &preferences.gender),
            ("birth_decade", &preferences.birth_decade),
            ("location", &preferences.location),
            ("category", &preferences.category),
        ];
        for (table, vectors) in tables {
            if let Some((key, v)) = vectors.iter().find(|(_, v)| v.len() != dimension) {
                return Err(AppError::ModelLoad(format!(
                    "Preference vector {}[{}] has dimension {}, expected {}",
                    table,
                    key,
                    v.len(),
                    dimension
                )));
            }
        }

        let mut names = HashSet::new();
        let mut segments = Vec::with_capacity(specs.len());
        for spec in specs {
            if !names.insert(spec.name.clone()) {
                return Err(AppError::ModelLoad(format!("Duplicate segment {}", spec.name)));
            }
            if let Some(bad) = spec
                .items
                .iter()
                .find(|item| item.id.is_empty() || item.id.contains(ITEM_DELIMITER))
            {
                return Err(AppError::ModelLoad(format!(
                    "Segment {} has unusable item id {:?}",
                    spec.name, bad.id
                )));
            }

            let items = spec
                .items
                .into_iter()
                .map(|item| (item.id, item.vector))
                .collect();
            let index = AnnIndex::build(dimension, items, params)?;

            tracing::debug!(segment = %spec.name, items = index.len(), "Built segment index");

            segments.push(Segment {
                name: spec.name,
                categories: spec.categories.into_iter().collect(),
                index,
            });
        }

        Ok(Self {
            preferences,
            profiles,
            segments,
        })
    }

    pub fn dimension(&self) -> usize {
        self.preferences.dimension
    }

    /// Segments in priority order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn default_segment(&self) -> &Segment {
        &self.segments[0]
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// Items never recommended to `user_id`: the user themselves plus actioned items
    pub fn exclusions_for(&self, user_id: &str) -> HashSet<String> {
        let mut excluded: HashSet<String> = self
            .profiles
            .get(user_id)
            .map(|p| p.excluded.iter().cloned().collect())
            .unwrap_or_default();
        excluded.insert(user_id.to_string());
        excluded
    }
}

/// Durable storage holding the reference bundle
#[async_trait::async_trait]
pub trait ReferenceSource: Send + Sync {
    async fn load(&self) -> AppResult<ReferenceBundle>;

    /// Source description for logging
    fn describe(&self) -> String;
}

/// Reads the bundle from JSON files in a model directory
pub struct FileReferenceSource {
    dir: PathBuf,
}

impl FileReferenceSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, file: &str) -> AppResult<T> {
        let path = self.dir.join(file);
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            AppError::ModelLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::ModelLoad(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

#[async_trait::async_trait]
impl ReferenceSource for FileReferenceSource {
    async fn load(&self) -> AppResult<ReferenceBundle> {
        Ok(ReferenceBundle {
            preferences: self.read_json(PREFERENCES_FILE).await?,
            profiles: self.read_json(PROFILES_FILE).await?,
            segments: self.read_json(SEGMENTS_FILE).await?,
        })
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Bundle already in memory
pub struct StaticReferenceSource {
    bundle: ReferenceBundle,
}

impl StaticReferenceSource {
    pub fn new(bundle: ReferenceBundle) -> Self {
        Self { bundle }
    }
}

#[async_trait::async_trait]
impl ReferenceSource for StaticReferenceSource {
    async fn load(&self) -> AppResult<ReferenceBundle> {
        Ok(self.bundle.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

/// Lazily loaded reference data, shared by synthesis and retrieval
///
/// The first caller runs the load; concurrent callers wait on the same
/// initialization and every later caller gets the same `Arc`. A failed load
/// leaves the holder unloaded so the next access tries again.
pub struct ModelHolder {
    source: Arc<dyn ReferenceSource>,
    params: IndexParams,
    data: OnceCell<Arc<ReferenceData>>,
}

impl ModelHolder {
    pub fn new(source: Arc<dyn ReferenceSource>, params: IndexParams) -> Self {
        Self {
            source,
            params,
            data: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data.initialized()
    }

    /// Returns the loaded data, loading it on first access
    pub async fn get(&self) -> AppResult<Arc<ReferenceData>> {
        self.data
            .get_or_try_init(|| self.load())
            .await
            .map(Arc::clone)
    }

    async fn load(&self) -> AppResult<Arc<ReferenceData>> {
        let start = Instant::now();
        tracing::info!(source = %self.source.describe(), "Loading reference data");

        let bundle = self.source.load().await.map_err(|e| {
            tracing::error!(error = %e, "Reference data load failed");
            e
        })?;

        // Index construction is CPU-bound
        let params = self.params;
        let data = tokio::task::spawn_blocking(move || ReferenceData::build(bundle, params))
            .await
            .map_err(|e| AppError::Internal(format!("Index build task failed: {}", e)))??;

        tracing::info!(
            segments = data.segments().len(),
            dimension = data.dimension(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reference data loaded"
        );

        Ok(Arc::new(data))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct CountingSource {
        loads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ReferenceSource for CountingSource {
        async fn load(&self) -> AppResult<ReferenceBundle> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(fixtures::bundle())
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    struct FailingSource;

    #[async_trait::async_trait]
    impl ReferenceSource for FailingSource {
        async fn load(&self) -> AppResult<ReferenceBundle> {
            Err(AppError::ModelLoad("storage offline".to_string()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_access_loads_once() {
        let source = Arc::new(CountingSource {
            loads: AtomicUsize::new(0),
        });
        let holder = Arc::new(ModelHolder::new(source.clone(), IndexParams::default()));
        assert!(!holder.is_loaded());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let holder = holder.clone();
                tokio::spawn(async move { holder.get().await.map(|d| Arc::as_ptr(&d) as usize) })
            })
            .collect();

        let mut pointers = Vec::new();
        for task in tasks {
            pointers.push(task.await.unwrap().unwrap());
        }

        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
        assert!(pointers.windows(2).all(|w| w[0] == w[1]));
        assert!(holder.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_stays_unloaded() {
        let holder = ModelHolder::new(Arc::new(FailingSource), IndexParams::default());
        assert!(matches!(holder.get().await, Err(AppError::ModelLoad(_))));
        assert!(!holder.is_loaded());
    }

    #[tokio::test]
    async fn test_file_source_reads_model_dir() {
        let bundle = fixtures::bundle();
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(PREFERENCES_FILE),
            serde_json::to_string(&bundle.preferences).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(PROFILES_FILE),
            serde_json::to_string(&bundle.profiles).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join(SEGMENTS_FILE),
            serde_json::to_string(&bundle.segments).unwrap(),
        )
        .unwrap();

        let holder = ModelHolder::new(
            Arc::new(FileReferenceSource::new(dir.path())),
            IndexParams::default(),
        );
        let data = holder.get().await.unwrap();
        assert_eq!(data.dimension(), 2);
        assert_eq!(data.segments().len(), 3);
        assert_eq!(data.default_segment().name, "general");
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempdir().unwrap();
        let source = FileReferenceSource::new(dir.path());
        let err = source.load().await.unwrap_err();
        assert!(err.to_string().contains(PREFERENCES_FILE));
    }

    #[test]
    fn test_exclusions_include_self() {
        let data = fixtures::reference();
        let excluded = data.exclusions_for("u1");
        assert!(excluded.contains("u1"));
        assert!(excluded.contains("a0"));

        let excluded = data.exclusions_for("stranger");
        assert_eq!(excluded.len(), 1);
    }

    #[test]
    fn test_build_rejects_delimiter_in_item_id() {
        let mut bundle = fixtures::bundle();
        bundle.segments[0].items[0].id = "bad,id".to_string();
        let err = ReferenceData::build(bundle, IndexParams::default());
        assert!(matches!(err, Err(AppError::ModelLoad(_))));
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let mut bundle = fixtures::bundle();
        bundle
            .preferences
            .category
            .insert("chess".to_string(), vec![1.0, 0.0, 0.0]);
        assert!(ReferenceData::build(bundle, IndexParams::default()).is_err());
    }

    #[test]
    fn test_build_requires_a_segment() {
        let mut bundle = fixtures::bundle();
        bundle.segments.clear();
        assert!(ReferenceData::build(bundle, IndexParams::default()).is_err());
    }
}
