// Application layer - Report use cases and the ports they depend on
pub mod dashboard_repository;
pub mod document_assembler;
pub mod errors;
pub mod panel_fetch;
pub mod report_service;
pub mod template_registry;
