/// Exit status reported when a command could not be completed at all.
///
/// Real remote exit codes are 0-255, so this can never be mistaken for one.
pub const SENTINEL_EXIT_STATUS: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Raw stdout bytes, exactly as the remote side produced them.
    Inline(Vec<u8>),
    /// Output was streamed into a local file.
    Spilled(std::path::PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The remote process exited normally with this status, zero or not.
    Exited(u32),
    /// The command never produced an exit status, even after retries.
    TransportFailure(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub host: String,
    pub port: u16,
    pub command: String,
    pub stdout: Output,
    pub stderr: String,
    pub outcome: Outcome,
}

impl ExecutionResult {
    pub fn exit_status(&self) -> u32 {
        match self.outcome {
            Outcome::Exited(code) => code,
            Outcome::TransportFailure(_) => SENTINEL_EXIT_STATUS,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::TransportFailure(_))
    }

    /// Inline stdout, empty if the output was spilled to a file.
    pub fn stdout_bytes(&self) -> &[u8] {
        match &self.stdout {
            Output::Inline(bytes) => bytes,
            Output::Spilled(_) => &[],
        }
    }

    /// Turns a transport failure into an error naming the command and host.
    pub fn ensure_completed(self) -> Result<Self, crate::Error> {
        match self.outcome {
            Outcome::Exited(_) => Ok(self),
            Outcome::TransportFailure(reason) => Err(crate::Error::ExecutionFailed {
                host: self.host,
                port: self.port,
                command: self.command,
                reason,
            }),
        }
    }
}
