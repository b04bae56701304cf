// Per-field analysis workflow and its persistence collaborator

pub mod field_lock;
pub mod orchestrator;
pub mod store;
