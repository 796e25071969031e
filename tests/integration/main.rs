mod common;

mod agent_api_test;
mod health_test;
mod learning_e2e_test;
