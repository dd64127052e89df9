use std::sync::Arc;

use billforge_core::{BillingEngine, LifecycleManager, Repository};

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub billing: Arc<BillingEngine>,
    pub repository: Arc<dyn Repository>,
}

impl AppState {
    pub fn new(lifecycle: Arc<LifecycleManager>, billing: Arc<BillingEngine>, repository: Arc<dyn Repository>) -> Self {
        Self { lifecycle, billing, repository }
    }
}
