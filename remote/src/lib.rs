//! SSH side of rtcmp: endpoints, authenticated sessions and the shell commands
//! run through them.
//!
//! The comparison engine only talks to the [`Executor`] trait; [`SessionClient`]
//! is the production implementation.

mod auth;
pub mod client;
pub mod command;
pub mod endpoint;
pub mod error;
pub mod listing;
pub mod result;

pub use client::{RetryConfig, SessionClient};
pub use command::CommandError;
pub use endpoint::{DEFAULT_SSH_PORT, KeyFile, ServerEndpoint};
pub use error::Error;
pub use listing::retrieve_listing;
pub use result::{ExecutionResult, Outcome, Output, SENTINEL_EXIT_STATUS};

/// Runs shell commands on one remote host.
///
/// A non-zero exit status is data, not an error. `Err` is reserved for failures
/// on the local side (e.g. the redirect file could not be written); a command
/// that could not be completed remotely comes back as [`Outcome::TransportFailure`].
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// `user@host:port` of the remote side.
    fn id(&self) -> String;

    async fn execute(&self, command: &str, elevate: bool) -> Result<ExecutionResult, Error>;

    /// Like [`Executor::execute`] but streams stdout into `sink` instead of memory.
    async fn execute_with_redirect(
        &self,
        command: &str,
        elevate: bool,
        sink: &std::path::Path,
    ) -> Result<ExecutionResult, Error>;
}
