pub mod app;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod profiles;
pub mod state;
pub mod stats;
pub mod storage;

pub use app::router;
pub use config::Config;
pub use gateway::AiClient;
pub use profiles::ProfileStore;
pub use state::AppState;
pub use storage::{FileBackend, KvStore};
