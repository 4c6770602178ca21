//! RPC server subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig (address, max_message_size, tls)
//!     → supervisor.rs (TLS → bind → serve → drain → cleanup)
//!     → hosted.rs (domain services registered through a trait seam)
//!     → pid_file.rs (runme.pid next to a filesystem socket)
//!
//! runme server stop
//!     → pid_file.rs (read) → SIGINT → supervisor drains and exits
//! ```

pub mod hosted;
pub mod pid_file;
pub mod supervisor;

pub use hosted::HostedService;
pub use pid_file::PidFile;
pub use supervisor::{stop, BoundSupervisor, Supervisor, SupervisorState};
