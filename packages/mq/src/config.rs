pub type PublishConfig = broccoli_queue::queue::PublishOptions;
pub type ConsumeConfig = broccoli_queue::queue::ConsumeOptions;

/// Redis connection settings.
pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
}

impl From<&common::config::MqAppConfig> for MqConfig {
    fn from(cfg: &common::config::MqAppConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            pool_size: cfg.pool_size,
        }
    }
}

/// Deliveries stay pending until explicitly acknowledged or rejected.
pub fn manual_ack() -> ConsumeConfig {
    ConsumeConfig::builder().auto_ack(false).build()
}
