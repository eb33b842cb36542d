use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::{
    admin_repository::AdminRepository, memory_store::MemoryStore,
    postgres_admin_repository::PostgresAdminRepository,
    postgres_token_repository::PostgresTokenRepository,
    postgres_user_repository::PostgresUserRepository, token_repository::TokenRepository,
    user_repository::UserRepository,
};
use crate::services::accounts::AccountService;
use crate::utils::clock::{Clock, SystemClock};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub admin_repo: Arc<dyn AdminRepository>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn postgres(pool: PgPool, config: Arc<Config>) -> Self {
        Self {
            users: Arc::new(PostgresUserRepository { pool: pool.clone() }),
            tokens: Arc::new(PostgresTokenRepository { pool: pool.clone() }),
            admin_repo: Arc::new(PostgresAdminRepository { pool }),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Every repository backed by one shared [`MemoryStore`].
    pub fn in_memory(store: Arc<MemoryStore>, clock: Arc<dyn Clock>, config: Arc<Config>) -> Self {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            admin_repo: store,
            clock,
            config,
        }
    }

    pub fn accounts(&self) -> AccountService {
        AccountService::new(
            self.users.clone(),
            self.tokens.clone(),
            self.clock.clone(),
            self.config.tokens,
        )
    }
}

#[cfg(test)]
pub fn test_config() -> Arc<Config> {
    use crate::config::LogFormat;
    use crate::models::TokenSettings;

    Arc::new(Config {
        database_url: "postgres://localhost/accounts_test".into(),
        bind_addr: ([127, 0, 0, 1], 0).into(),
        tokens: TokenSettings::default(),
        log_format: LogFormat::Pretty,
    })
}
