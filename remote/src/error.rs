#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to connect to {host}:{port}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: russh::Error,
    },

    #[error("authentication failed for {user}@{host}:{port}, no usable credential was accepted")]
    AuthenticationFailed {
        host: String,
        port: u16,
        user: String,
    },

    #[error("ssh session failure on {host}:{port}")]
    Session {
        host: String,
        port: u16,
        #[source]
        source: russh::Error,
    },

    #[error("command '{command}' on {host}:{port} failed: {reason}")]
    ExecutionFailed {
        host: String,
        port: u16,
        command: String,
        reason: String,
    },

    #[error(transparent)]
    Command(#[from] crate::command::CommandError),

    #[error("local I/O failure on {path:?}")]
    LocalIo {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
