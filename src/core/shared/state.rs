use crate::core::config::AppConfig;
use crate::tickets::{TicketService, TicketStore};
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub tickets: Arc<TicketService>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn TicketStore>) -> Self {
        let tickets = Arc::new(TicketService::new(store, config.assignment.clone()));
        Self { config, tickets }
    }
}
