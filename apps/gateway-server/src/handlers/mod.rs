//! Handlers 模块

pub mod commands;
pub mod health;
pub mod metrics;
pub mod protocols;
pub mod sessions;

pub use commands::*;
pub use health::*;
pub use metrics::*;
pub use protocols::*;
pub use sessions::*;
