//! The application context: every subsystem handle assembled once at startup
//! and threaded explicitly through calls, replacing the "global mutable
//! singletons" the source relied on for settings/executor/index state
//! (spec.md §9).

use std::sync::Arc;

use crate::artifact_store::ArtifactStore;
use crate::config::Config;
use crate::providers::ProviderSet;
use crate::store::MetadataStore;
use crate::vector_index::VectorIndexRegistry;

pub struct CoreContext {
    pub config: Config,
    pub store: Arc<MetadataStore>,
    pub artifacts: Arc<ArtifactStore>,
    pub vector_indexes: Arc<VectorIndexRegistry>,
    pub providers: Arc<ProviderSet>,
}

impl CoreContext {
    pub async fn assemble(config: Config) -> crate::error::CoreResult<Arc<Self>> {
        let store = Arc::new(MetadataStore::open(&config.database_path).await?);
        let artifacts = Arc::new(ArtifactStore::new(config.derived_path.clone()));
        let vector_indexes = Arc::new(VectorIndexRegistry::new(config.derived_path.join("vector_index")));
        let providers = Arc::new(ProviderSet::from_config(&config));

        Ok(Arc::new(Self {
            config,
            store,
            artifacts,
            vector_indexes,
            providers,
        }))
    }
}
