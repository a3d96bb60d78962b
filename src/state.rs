use crate::auth::repo::{MemoryUserStore, UserStore};
use crate::config::{AppConfig, UserStoreConfig};
use crate::generate::completion::{CompletionClient, GeminiClient};
use crate::sheets::SheetsUserStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
    pub completion: Arc<dyn CompletionClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let users = match &config.user_store {
            UserStoreConfig::Memory => {
                tracing::warn!("USER_STORE=memory, registrations are lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
            UserStoreConfig::Sheets(sheets) => {
                Arc::new(SheetsUserStore::connect(sheets).await?) as Arc<dyn UserStore>
            }
        };

        let completion = Arc::new(GeminiClient::new(&config.gemini)) as Arc<dyn CompletionClient>;

        Ok(Self {
            config,
            users,
            completion,
        })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        completion: Arc<dyn CompletionClient>,
    ) -> Self {
        Self {
            config,
            users,
            completion,
        }
    }
}
