//! Keeps running containers on the latest version of their image tag.

pub mod auth;
pub mod classify;
pub mod cleanup;
pub mod config;
pub mod decision;
pub mod error;
pub mod executor;
pub mod notify;
pub mod policy;
pub mod runtime;
pub mod scheduler;
pub mod selector;
pub mod test_support;
pub mod types;

pub use config::{Config, Settings};
pub use runtime::{ContainerEngine, DockerEngine};
pub use scheduler::{shutdown_channel, CycleSummary, Scheduler, Shutdown, ShutdownTrigger};
