// Domain layer - Dashboard layout, time ranges and report identity
pub mod dashboard;
pub mod layout;
pub mod report;
pub mod timerange;
