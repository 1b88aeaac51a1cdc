pub mod capture_session;
pub mod event_pipeline;
pub mod monitor_config;
pub mod pipeline_logger;
