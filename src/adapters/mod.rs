pub mod agent_handler;
pub mod api_handler;
pub mod config_tool;
pub mod health_handler;
pub mod learning_handler;
pub mod metrics_handler;
