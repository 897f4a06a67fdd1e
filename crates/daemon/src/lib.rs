pub mod config;
pub mod dump;
pub mod notify;

mod app;
pub use app::{build_orchestrator, build_orchestrator_with};
