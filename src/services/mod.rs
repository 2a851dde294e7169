pub mod config_service;
pub mod insight_service;
pub mod message_service;
pub mod monitor_service;
pub mod pipeline_service;
pub mod relocation_service;
pub mod resolver_service;
pub mod stability_service;
