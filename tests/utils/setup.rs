use std::sync::Arc;

use kudos::config::GamificationConfig;
use kudos::engine::{GamificationEngine, InMemoryHandles};
use kudos::event::EventBus;
use kudos::users::{UserModel, UserRepository};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub engine: Arc<GamificationEngine>,
    pub handles: InMemoryHandles,
    pub event_bus: EventBus,
    pub users: Vec<String>,
}

pub struct TestSetupBuilder {
    users: Vec<String>,
    config: GamificationConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            config: GamificationConfig::default(),
        }
    }

    pub fn with_users(mut self, users: Vec<&str>) -> Self {
        self.users = users.into_iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_single_user(self) -> Self {
        self.with_users(vec!["alice"])
    }

    #[allow(dead_code)]
    pub fn with_config(mut self, config: GamificationConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> TestSetup {
        let event_bus = EventBus::with_default_capacity();
        let (engine, handles) = GamificationEngine::in_memory(self.config, event_bus.clone());

        engine
            .initialize_catalogs()
            .await
            .expect("catalog seeding should succeed");

        for user_id in &self.users {
            handles
                .users
                .create_user(&UserModel::new(
                    user_id.clone(),
                    format!("user-{user_id}"),
                    "Iniciante",
                ))
                .await
                .expect("user creation should succeed");
        }

        TestSetup {
            engine,
            handles,
            event_bus,
            users: self.users,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}
