pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod realtime;

use crate::app::auth::SessionTokens;
use crate::infra::{db::Db, storage::ObjectStorage};
use crate::realtime::PresenceTracker;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub storage: ObjectStorage,
    pub presence: PresenceTracker,
    pub tokens: SessionTokens,
    pub cookie_secure: bool,
    pub upload_max_bytes: usize,
}
