//! feedsift Server
//!
//! Accepts a free-text prompt over HTTP, registers it with the evaluation
//! pipeline and streams every matching feed update back as server-sent
//! events.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use config::{ListenConfig, ServerConfig};
pub use routes::{create_router, AppError, MatchEvent};
pub use state::AppState;
