// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod credentials;
pub mod grafana_repository;
pub mod http_response;
pub mod latex_assembler;
