//! Local model artifact persistence

mod local;

pub use local::{LocalArtifactStore, MetadataDraft, PersistedModel, LATEST_KEY};
