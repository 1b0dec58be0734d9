use std::sync::Arc;

use crate::services::{QueryRouter, RecommendationService};

/// Services mounted by the router; an absent service leaves its routes unmounted
#[derive(Clone, Default)]
pub struct AppState {
    pub queries: Option<Arc<QueryRouter>>,
    pub recommender: Option<Arc<RecommendationService>>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queries(mut self, router: Arc<QueryRouter>) -> Self {
        self.queries = Some(router);
        self
    }

    pub fn with_recommender(mut self, service: Arc<RecommendationService>) -> Self {
        self.recommender = Some(service);
        self
    }
}
