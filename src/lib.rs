pub mod audio;
pub mod config;
pub mod kernel;
pub mod outputs;
pub mod services;

// Re-export specific items if needed for convenient access
pub use kernel::coordinator::Coordinator;
