#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod cache;
pub mod config;
mod core;
mod error;
mod graph;
mod io;
mod orchestrator;
pub mod pipeline;
mod report;
#[cfg(feature = "live")]
mod server;
pub mod transform;
#[cfg(feature = "live")]
pub mod watch;

pub use crate::cache::Cache;
pub use crate::config::Config;
pub use crate::core::{Environment, Hash32, Mode, Notification};
pub use crate::error::*;
pub use crate::graph::{Task, TaskGraph};
pub use crate::io::{clean, remove};
pub use crate::orchestrator::Orchestrator;
pub use crate::report::{BuildReport, Outcome, TaskReport};
#[cfg(feature = "live")]
pub use crate::server::DevServer;
pub use crate::transform::{Invocation, Produced, Transform};
#[cfg(feature = "live")]
pub use crate::watch::{ShutdownHandle, Watcher};
