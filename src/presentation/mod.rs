// Presentation layer - HTTP handlers, command line and shared state
pub mod app_state;
pub mod cli;
pub mod handlers;
