//! fedvote node: hosts the election core inside a running process.
//!
//! The node owns the pieces around the protocol:
//! - Decodes peer envelopes and routes election messages to their election
//! - Starts elections on leader-fault triggers and drives round timeouts
//! - Applies committed roster swaps to the live roster
//! - Configuration, structured logging, metrics and graceful shutdown

pub mod config;
pub mod election_service;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod shutdown;
pub mod tracing_spans;
pub mod wire_message;

pub use config::NodeConfig;
pub use election_service::{CommitReport, ElectionService, ServiceEvent, ServiceOutput, Trigger};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use shutdown::ShutdownController;
pub use wire_message::{KeepaliveMsg, WireMessage};
