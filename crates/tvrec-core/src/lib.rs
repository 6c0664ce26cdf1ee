pub mod config;
pub mod logging;

pub mod capture;
pub mod delivery;
pub mod job;
pub mod media;
pub mod naming;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod status;
