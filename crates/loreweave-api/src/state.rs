use std::sync::Arc;
use std::time::Duration;

use tracing::error;

use loreweave_db::Database;
use loreweave_gateway::Notifier;

use crate::error::ApiError;
use crate::verification::{Mailer, VerificationCodes};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub notifier: Notifier,
    pub mailer: Arc<dyn Mailer>,
    pub codes: VerificationCodes,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        jwt_secret: String,
        notifier: Notifier,
        mailer: Arc<dyn Mailer>,
        code_ttl: Duration,
    ) -> AppState {
        Arc::new(Self {
            db,
            jwt_secret,
            notifier,
            mailer,
            codes: VerificationCodes::new(code_ttl),
        })
    }

    /// Run blocking DB work off the async runtime.
    pub async fn with_db<F, T, E>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Into<ApiError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(e.into())
            })?
            .map_err(Into::into)
    }
}
