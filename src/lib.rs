//! tunup - supervisor for a single ngrok tunnel-agent process
//!
//! This library spawns the agent binary at most once, detects readiness
//! from its log output, memoizes the resulting internal web API URL for
//! concurrent callers, and tears the process down on shutdown. One-shot
//! credential registration runs independently of the supervised instance.

pub mod auth;
pub mod error;
pub mod matcher;
pub mod options;
pub mod process;
pub mod supervisor;

pub use auth::set_authtoken;
pub use error::{Error, Result};
pub use matcher::{classify, ReadinessEvent};
pub use options::{default_bin_dir, BinPathResolver, Options, BIN_NAME};
pub use process::AgentProcess;
pub use supervisor::{on_host_shutdown, Supervisor};
