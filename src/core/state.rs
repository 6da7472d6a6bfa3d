use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::scoring::SimilarityScorer;
use crate::services::storage::StorageService;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    storage: StorageService,
    scorer: SimilarityScorer,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        db: PgPool,
        storage: StorageService,
        scorer: SimilarityScorer,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, db, storage, scorer }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn storage(&self) -> &StorageService {
        &self.inner.storage
    }

    pub(crate) fn scorer(&self) -> &SimilarityScorer {
        &self.inner.scorer
    }
}
