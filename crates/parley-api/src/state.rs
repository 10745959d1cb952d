use std::sync::Arc;

use parley_db::Database;

use crate::rate_limit::RateLimiter;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub limiter: RateLimiter,
}
