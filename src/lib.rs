pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod notifications;
pub mod store;

pub use db::DbPool;

use config::Config;
use std::sync::Arc;

use crate::engine::{FreelancerSearch, Lifecycle, SlotCalculator, WorkingHours};
use crate::notifications::NotificationHub;
use crate::store::MarketStore;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn MarketStore>,
    pub notifications: Arc<NotificationHub>,
    pub search: FreelancerSearch,
    pub slots: SlotCalculator,
    pub lifecycle: Lifecycle,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn MarketStore>) -> Self {
        let notifications = Arc::new(NotificationHub::new(
            config.notifications.connection_buffer,
        ));
        let hours = WorkingHours::from(&config.schedule);

        Self {
            search: FreelancerSearch::new(store.clone()),
            slots: SlotCalculator::new(store.clone(), hours),
            lifecycle: Lifecycle::new(store.clone(), notifications.clone()),
            notifications,
            store,
            config,
        }
    }
}
