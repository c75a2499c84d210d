use crate::gateway::AiClient;
use crate::profiles::ProfileStore;
use crate::stats::Locale;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone)]
pub struct AppState {
    pub profiles: Arc<Mutex<ProfileStore>>,
    pub ai: AiClient,
    pub locale: Locale,
}

impl AppState {
    pub fn new(profiles: ProfileStore, ai: AiClient, locale: Locale) -> Self {
        Self {
            profiles: Arc::new(Mutex::new(profiles)),
            ai,
            locale,
        }
    }
}
