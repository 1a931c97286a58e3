use crate::auth::jwt::TokenService;
use crate::auth::password::PasswordHasher;
use crate::config::{AppConfig, StoreBackend};
use crate::mail::{self, Mailer};
use crate::tours::{MemoryTourStore, PgTourStore, TourStore};
use crate::users::{MemoryUserStore, PgUserStore, UserStore};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: Arc<TokenService>,
    pub passwords: Arc<PasswordHasher>,
    pub users: Arc<dyn UserStore>,
    pub tours: Arc<dyn TourStore>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let (users, tours): (Arc<dyn UserStore>, Arc<dyn TourStore>) = match config.store {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;
                let db = crate::db::connect(url).await?;
                info!("using postgres store");
                (
                    Arc::new(PgUserStore::new(db.clone())),
                    Arc::new(PgTourStore::new(db)),
                )
            }
            StoreBackend::Memory => {
                info!("using in-memory store");
                (
                    Arc::new(MemoryUserStore::new()),
                    Arc::new(MemoryTourStore::new()),
                )
            }
        };

        let mailer = mail::from_config(&config.mail)?;
        Self::from_parts(config, users, tours, mailer)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        tours: Arc<dyn TourStore>,
        mailer: Arc<dyn Mailer>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            tokens: Arc::new(TokenService::new(&config.jwt)),
            passwords: Arc::new(PasswordHasher::new(&config.password)?),
            config,
            users,
            tours,
            mailer,
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with_mailer(Arc::new(crate::mail::LogMailer))
    }

    /// In-memory stores and cheap hashing, in development mode.
    #[cfg(test)]
    pub fn fake_with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        use crate::config::{Environment, JwtConfig, MailConfig, PasswordConfig};

        let config = Arc::new(AppConfig {
            environment: Environment::Development,
            host: "127.0.0.1".into(),
            port: 0,
            store: StoreBackend::Memory,
            database_url: None,
            public_url: "http://localhost:8080".into(),
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
            reset_token_ttl_minutes: 10,
            mail: MailConfig {
                host: None,
                port: 587,
                username: None,
                password: None,
                from: "Tourbook <no-reply@tourbook.local>".into(),
            },
        });

        Self::from_parts(
            config,
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryTourStore::new()),
            mailer,
        )
        .expect("valid test state")
    }
}
