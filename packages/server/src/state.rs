use std::sync::Arc;

use mq::EventPublisher;
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::health::HealthService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub publisher: EventPublisher,
    pub health: Arc<HealthService>,
}
