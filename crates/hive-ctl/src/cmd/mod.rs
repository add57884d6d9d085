//! CLI command modules.

pub mod http;
pub mod jobs;
pub mod reputation;
pub mod status;
pub mod workers;
