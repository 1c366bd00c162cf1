pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod producer;
pub mod redis;

pub use broker::{Broker, Delivery};
pub use config::{ConsumeConfig, MqConfig};
pub use consumer::Consumer;
pub use error::MqError;
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use redis::{RedisBroker, init_mq};
