pub mod core;
pub mod tests;
pub mod tickets;

pub use crate::core::config::AppConfig;
pub use crate::core::http::build_router;
pub use crate::core::shared::state::AppState;
