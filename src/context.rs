use std::sync::Arc;

use crate::config::Settings;
use crate::core::RcloneRunner;

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub runner: RcloneRunner,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        let runner = RcloneRunner::new(settings.executable.clone());
        Self {
            settings: Arc::new(settings),
            runner,
        }
    }
}
