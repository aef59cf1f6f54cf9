pub mod client;
pub mod orchestrator;
