//! Filesystem artifact store with a "latest" pointer
//!
//! Layout under the store directory:
//!
//! ```text
//! model_<version>.json      metadata_<version>.json
//! model_latest.json         metadata_latest.json
//! ```
//!
//! Every file is staged under a temporary name and renamed into place. A
//! version is claimed by exclusively creating its model file, so concurrent
//! writers never share one. Persists within a process are serialized, the
//! latest pair is swapped under a write lock and readers verify that the
//! artifact's embedded version matches the metadata.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    Classifier, DomainError, MetricMap, ModelArtifact, ModelMetadata, ModelVersion, ParamMap,
};
use crate::infrastructure::classifier::decode_artifact;

/// Key of the mutable alias to the most recent artifact
pub const LATEST_KEY: &str = "latest";

const ARTIFACT_EXTENSION: &str = "json";

static LATEST_LOCK: RwLock<()> = RwLock::new(());

static PERSIST_LOCK: Mutex<()> = Mutex::new(());

/// Metadata fields known before a version is assigned
#[derive(Debug, Clone)]
pub struct MetadataDraft {
    pub training_date: DateTime<Utc>,
    pub metrics: MetricMap,
    pub parameters: ParamMap,
    pub features: Vec<String>,
    pub target: String,
}

/// Paths written by a successful persist
#[derive(Debug, Clone)]
pub struct PersistedModel {
    pub metadata: ModelMetadata,
    pub model_path: PathBuf,
    pub metadata_path: PathBuf,
    pub latest_model_path: PathBuf,
    pub latest_metadata_path: PathBuf,
}

/// Local directory of versioned model artifacts
#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("model_{}.{}", key, ARTIFACT_EXTENSION))
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("metadata_{}.json", key))
    }

    /// Write a new version and repoint latest at it; all or nothing
    pub fn persist(
        &self,
        classifier: &dyn Classifier,
        draft: MetadataDraft,
    ) -> Result<PersistedModel, DomainError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            DomainError::persist(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;

        let _persist = PERSIST_LOCK
            .lock()
            .map_err(|e| DomainError::persist(format!("Persist lock poisoned: {}", e)))?;

        let version = self.claim_version(ModelVersion::generate())?;
        let result = self.persist_claimed(classifier, draft, &version);

        if result.is_err() {
            remove_quietly(&self.model_path(version.as_str()));
            remove_quietly(&self.metadata_path(version.as_str()));
        }

        result
    }

    fn persist_claimed(
        &self,
        classifier: &dyn Classifier,
        draft: MetadataDraft,
        version: &ModelVersion,
    ) -> Result<PersistedModel, DomainError> {
        let model_path = self.model_path(version.as_str());
        let metadata_path = self.metadata_path(version.as_str());

        let metadata = ModelMetadata {
            version: version.clone(),
            training_date: draft.training_date,
            model_type: classifier.model_type().to_string(),
            metrics: draft.metrics,
            parameters: draft.parameters,
            features: draft.features,
            target: draft.target,
            model_path: model_path.display().to_string(),
        };

        let artifact = ModelArtifact::from_classifier(classifier, Some(version.clone()))?
            .to_bytes()
            .map_err(|e| DomainError::persist(e.to_string()))?;
        let document = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| DomainError::persist(format!("Failed to serialize metadata: {}", e)))?;

        self.write_versioned(&model_path, &metadata_path, &artifact, &document)?;
        self.swap_latest(&artifact, &document)?;

        info!(
            version = %version,
            path = %model_path.display(),
            "Model saved as version and latest"
        );

        Ok(PersistedModel {
            metadata,
            model_path,
            metadata_path,
            latest_model_path: self.model_path(LATEST_KEY),
            latest_metadata_path: self.metadata_path(LATEST_KEY),
        })
    }

    /// Metadata currently behind the latest pointer
    pub fn read_latest_metadata(&self) -> Result<ModelMetadata, DomainError> {
        let _guard = LATEST_LOCK
            .read()
            .map_err(|e| DomainError::persist(format!("Latest lock poisoned: {}", e)))?;
        self.read_metadata_file(&self.metadata_path(LATEST_KEY))
    }

    /// Latest artifact and metadata, checked to belong together
    pub fn read_latest(&self) -> Result<(ModelMetadata, Arc<dyn Classifier>), DomainError> {
        let _guard = LATEST_LOCK
            .read()
            .map_err(|e| DomainError::persist(format!("Latest lock poisoned: {}", e)))?;
        self.read_pair(LATEST_KEY)
    }

    /// A specific version's artifact and metadata
    pub fn read_version(
        &self,
        version: &ModelVersion,
    ) -> Result<(ModelMetadata, Arc<dyn Classifier>), DomainError> {
        self.read_pair(version.as_str())
    }

    /// Versions present in the store, oldest first
    pub fn list_versions(&self) -> Result<Vec<ModelVersion>, DomainError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DomainError::persist(format!(
                    "Failed to list {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut versions: Vec<ModelVersion> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let key = name.strip_prefix("metadata_")?.strip_suffix(".json")?;
                ModelVersion::parse(key).ok()
            })
            .collect();

        versions.sort();
        Ok(versions)
    }

    /// Reserve a version by creating its model file exclusively
    fn claim_version(&self, candidate: ModelVersion) -> Result<ModelVersion, DomainError> {
        let mut version = self.next_version(candidate);

        loop {
            let path = self.model_path(version.as_str());
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(version),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(version = %version, "Version taken by another writer");
                    version = self.next_version(version.next());
                }
                Err(e) => {
                    return Err(DomainError::persist(format!(
                        "Failed to claim {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }

    /// First version at or after `candidate` that is unused and newer than latest
    fn next_version(&self, candidate: ModelVersion) -> ModelVersion {
        let mut version = candidate;

        if let Ok(latest) = self.read_metadata_file(&self.metadata_path(LATEST_KEY)) {
            while version <= latest.version {
                version = version.next();
            }
        }

        while self.model_path(version.as_str()).exists()
            || self.metadata_path(version.as_str()).exists()
        {
            version = version.next();
        }

        version
    }

    fn write_versioned(
        &self,
        model_path: &Path,
        metadata_path: &Path,
        artifact: &[u8],
        document: &[u8],
    ) -> Result<(), DomainError> {
        let staged_model = self.stage(model_path, artifact)?;
        let staged_metadata = match self.stage(metadata_path, document) {
            Ok(path) => path,
            Err(e) => {
                remove_quietly(&staged_model);
                return Err(e);
            }
        };

        if let Err(e) = publish(&staged_model, model_path) {
            remove_quietly(&staged_model);
            remove_quietly(&staged_metadata);
            return Err(e);
        }

        if let Err(e) = publish(&staged_metadata, metadata_path) {
            remove_quietly(&staged_metadata);
            remove_quietly(model_path);
            return Err(e);
        }

        debug!(path = %metadata_path.display(), "Versioned metadata written");
        Ok(())
    }

    fn swap_latest(&self, artifact: &[u8], document: &[u8]) -> Result<(), DomainError> {
        let latest_model = self.model_path(LATEST_KEY);
        let latest_metadata = self.metadata_path(LATEST_KEY);

        let staged_model = self.stage(&latest_model, artifact)?;
        let staged_metadata = match self.stage(&latest_metadata, document) {
            Ok(path) => path,
            Err(e) => {
                remove_quietly(&staged_model);
                return Err(e);
            }
        };

        let _guard = LATEST_LOCK
            .write()
            .map_err(|e| DomainError::persist(format!("Latest lock poisoned: {}", e)))?;

        let previous = self
            .read_metadata_file(&latest_metadata)
            .ok()
            .map(|m| m.version);

        if let Err(e) = publish(&staged_model, &latest_model) {
            remove_quietly(&staged_model);
            remove_quietly(&staged_metadata);
            return Err(e);
        }

        if let Err(e) = publish(&staged_metadata, &latest_metadata) {
            remove_quietly(&staged_metadata);
            self.restore_latest_model(previous.as_ref(), &latest_model);
            return Err(e);
        }

        Ok(())
    }

    /// Put the previous latest artifact back after a failed swap
    fn restore_latest_model(&self, previous: Option<&ModelVersion>, latest_model: &Path) {
        let restored = previous.and_then(|version| {
            let bytes = fs::read(self.model_path(version.as_str())).ok()?;
            let staged = self.stage(latest_model, &bytes).ok()?;
            publish(&staged, latest_model).ok()
        });

        if restored.is_none() {
            warn!(
                path = %latest_model.display(),
                "Could not restore previous latest model, removing it"
            );
            remove_quietly(latest_model);
        }
    }

    fn read_pair(&self, key: &str) -> Result<(ModelMetadata, Arc<dyn Classifier>), DomainError> {
        let metadata = self.read_metadata_file(&self.metadata_path(key))?;

        let model_path = self.model_path(key);
        let bytes = read_file(&model_path)?;
        let artifact =
            ModelArtifact::from_bytes(&bytes).map_err(|e| DomainError::persist(e.to_string()))?;

        if artifact.version.as_ref() != Some(&metadata.version) {
            return Err(DomainError::persist(format!(
                "Artifact {} does not belong to metadata version {}",
                model_path.display(),
                metadata.version
            )));
        }

        let classifier =
            decode_artifact(artifact).map_err(|e| DomainError::persist(e.to_string()))?;

        Ok((metadata, classifier))
    }

    fn read_metadata_file(&self, path: &Path) -> Result<ModelMetadata, DomainError> {
        let bytes = read_file(path)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            DomainError::persist(format!("Malformed metadata {}: {}", path.display(), e))
        })
    }

    /// Write `bytes` to a unique temporary file next to `target`
    fn stage(&self, target: &Path, bytes: &[u8]) -> Result<PathBuf, DomainError> {
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staged = self.dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));

        let result = File::create(&staged).and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        });

        match result {
            Ok(()) => Ok(staged),
            Err(e) => {
                remove_quietly(&staged);
                Err(DomainError::persist(format!(
                    "Failed to write {}: {}",
                    target.display(),
                    e
                )))
            }
        }
    }
}

fn publish(staged: &Path, target: &Path) -> Result<(), DomainError> {
    fs::rename(staged, target).map_err(|e| {
        DomainError::persist(format!("Failed to publish {}: {}", target.display(), e))
    })
}

fn read_file(path: &Path) -> Result<Vec<u8>, DomainError> {
    fs::read(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            DomainError::not_found(format!("{} does not exist", path.display()))
        } else {
            DomainError::persist(format!("Failed to read {}: {}", path.display(), e))
        }
    })
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::classifier::mock::StubClassifier;

    fn draft(accuracy: f64) -> MetadataDraft {
        MetadataDraft {
            training_date: Utc::now(),
            metrics: MetricMap::from([("accuracy".to_string(), accuracy)]),
            parameters: ParamMap::new(),
            features: vec!["feature1".to_string()],
            target: "target".to_string(),
        }
    }

    fn forest() -> crate::infrastructure::classifier::RandomForestClassifier {
        use crate::domain::Table;
        use crate::infrastructure::classifier::{ForestParams, RandomForestClassifier};

        let x = Table::new(
            vec!["feature1".to_string()],
            (0..10).map(|i| vec![i as f64]).collect(),
        )
        .unwrap();
        let y: Vec<i64> = (0..10).map(|i| i64::from(i >= 5)).collect();

        RandomForestClassifier::fit(
            &x,
            &y,
            ForestParams {
                n_estimators: 3,
                ..ForestParams::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn test_persist_writes_versioned_and_latest_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        let persisted = store.persist(&forest(), draft(0.9)).unwrap();
        let version = persisted.metadata.version.as_str();

        assert!(store.model_path(version).exists());
        assert!(store.metadata_path(version).exists());
        assert!(persisted.latest_model_path.exists());
        assert!(persisted.latest_metadata_path.exists());

        let (latest, classifier) = store.read_latest().unwrap();
        assert_eq!(latest, persisted.metadata);
        assert_eq!(classifier.model_type(), "RandomForestClassifier");

        let (versioned, _) = store.read_version(&persisted.metadata.version).unwrap();
        assert_eq!(versioned, latest);
    }

    #[test]
    fn test_latest_tracks_most_recent_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = forest();

        let first = store.persist(&model, draft(0.5)).unwrap();
        let second = store.persist(&model, draft(0.7)).unwrap();

        assert!(second.metadata.version > first.metadata.version);

        let latest = store.read_latest_metadata().unwrap();
        assert_eq!(latest.version, second.metadata.version);
        assert_eq!(latest.metrics["accuracy"], 0.7);

        assert_eq!(
            store.list_versions().unwrap(),
            vec![first.metadata.version, second.metadata.version]
        );
    }

    #[test]
    fn test_concurrent_persists_get_distinct_versions() {
        use std::sync::Barrier;

        let model = forest();

        for _ in 0..5 {
            let dir = tempfile::tempdir().unwrap();
            let barrier = Barrier::new(4);

            let mut versions: Vec<ModelVersion> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..4)
                    .map(|i| {
                        let (model, barrier, path) = (&model, &barrier, dir.path());
                        scope.spawn(move || {
                            barrier.wait();
                            LocalArtifactStore::new(path)
                                .persist(model, draft(i as f64 / 10.0))
                                .unwrap()
                                .metadata
                                .version
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            versions.sort();
            let mut unique = versions.clone();
            unique.dedup();
            assert_eq!(unique.len(), 4, "duplicate versions: {:?}", versions);

            let store = LocalArtifactStore::new(dir.path());
            assert_eq!(store.list_versions().unwrap(), versions);
            for version in &versions {
                let (metadata, _) = store.read_version(version).unwrap();
                assert_eq!(&metadata.version, version);
            }

            let (latest, _) = store.read_latest().unwrap();
            assert_eq!(Some(&latest.version), versions.last());
        }
    }

    #[test]
    fn test_claimed_version_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let candidate = ModelVersion::generate();

        fs::create_dir_all(dir.path()).unwrap();
        File::create(store.model_path(candidate.as_str())).unwrap();

        let claimed = store.claim_version(candidate.clone()).unwrap();
        assert!(claimed > candidate);
        assert!(store.model_path(claimed.as_str()).exists());
    }

    #[test]
    fn test_failed_latest_swap_leaves_no_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = forest();

        let first = store.persist(&model, draft(0.5)).unwrap();

        // a non-empty directory cannot be replaced by a rename
        fs::remove_file(store.model_path(LATEST_KEY)).unwrap();
        fs::create_dir_all(store.model_path(LATEST_KEY).join("blocker")).unwrap();

        let result = store.persist(&model, draft(0.9));
        assert!(matches!(result, Err(DomainError::Persist { .. })));

        assert_eq!(store.list_versions().unwrap(), vec![first.metadata.version.clone()]);
        assert_eq!(
            store.read_latest_metadata().unwrap().version,
            first.metadata.version
        );
    }

    #[test]
    fn test_failed_metadata_swap_rolls_back_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());

        fs::create_dir_all(store.metadata_path(LATEST_KEY).join("blocker")).unwrap();

        let result = store.persist(&forest(), draft(0.9));
        assert!(matches!(result, Err(DomainError::Persist { .. })));

        assert!(!store.model_path(LATEST_KEY).exists());
        assert!(store.list_versions().unwrap().is_empty());
    }

    #[test]
    fn test_read_latest_detects_mismatched_pair() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let model = forest();

        let first = store.persist(&model, draft(0.5)).unwrap();
        store.persist(&model, draft(0.7)).unwrap();

        fs::copy(&first.model_path, store.model_path(LATEST_KEY)).unwrap();

        let result = store.read_latest();
        assert!(matches!(result, Err(DomainError::Persist { .. })));
    }

    #[test]
    fn test_read_latest_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path().join("missing"));

        assert!(store.read_latest().unwrap_err().is_not_found());
        assert!(store.list_versions().unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_model_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalArtifactStore::new(dir.path());
        let stub = StubClassifier::new(&["feature1"], vec![0, 1], 1);

        store.persist(&stub, draft(0.5)).unwrap();

        let result = store.read_latest();
        assert!(matches!(result, Err(DomainError::Persist { .. })));
    }
}
