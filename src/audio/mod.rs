pub mod capture;
pub mod chunker;
pub mod level;
