//! Remote Session Client: one authenticated SSH connection per host.
//!
//! Every command runs on its own short-lived channel. The connection itself is
//! shared by concurrent callers and replaced wholesale when it stops accepting
//! channels.

use russh::client::{Handle, Msg};
use russh::{Channel, Pty};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use zeroize::Zeroizing;

use crate::auth::{self, ClientHandler};
use crate::command;
use crate::endpoint::ServerEndpoint;
use crate::error::Error;
use crate::result::{ExecutionResult, Outcome, Output};

const PTY_TERM: &str = "xterm";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 40;
const PTY_BAUD: u32 = 14400;
const STDOUT_BUFFER_SIZE: usize = 8192;

/// Retry and deadline settings for command execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Attempts per command when the channel dies without an exit status (minimum 1)
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: std::time::Duration,
    /// Deadline for a single attempt, `None` waits forever
    pub command_timeout: Option<std::time::Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: std::time::Duration::from_millis(500),
            command_timeout: None,
        }
    }
}

/// Echo is off so nothing we send (e.g. a sudo password) comes back on stdout,
/// and output newlines are left as `\n`.
fn terminal_modes() -> [(Pty, u32); 4] {
    [
        (Pty::ECHO, 0),
        (Pty::ONLCR, 0),
        (Pty::TTY_OP_ISPEED, PTY_BAUD),
        (Pty::TTY_OP_OSPEED, PTY_BAUD),
    ]
}

pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// One event read off a command channel.
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(u32),
}

/// A session channel that runs exactly one command.
#[async_trait::async_trait]
pub trait CommandChannel: Send {
    /// Requests the pty, starts `command` and writes `stdin` to it.
    async fn start(&mut self, command: &str, stdin: Option<&[u8]>) -> Result<(), russh::Error>;

    /// Next event, `None` once the remote side closed the channel.
    async fn next_event(&mut self) -> Option<ChannelEvent>;
}

/// An authenticated connection handing out command channels.
#[async_trait::async_trait]
pub trait Link: Send + Sync + 'static {
    type Channel: CommandChannel;

    async fn open_channel(&self) -> Result<Self::Channel, russh::Error>;

    async fn close(&self) -> Result<(), russh::Error>;
}

/// Dials and authenticates new links to an endpoint.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: Link;

    async fn dial(&self, endpoint: &ServerEndpoint) -> Result<Self::Link, Error>;
}

type ChannelOf<C> = <<C as Connector>::Link as Link>::Channel;

#[async_trait::async_trait]
impl CommandChannel for Channel<Msg> {
    async fn start(&mut self, command: &str, stdin: Option<&[u8]>) -> Result<(), russh::Error> {
        self.request_pty(
            false,
            PTY_TERM,
            PTY_COLUMNS,
            PTY_ROWS,
            0,
            0,
            &terminal_modes(),
        )
        .await?;
        self.exec(true, command).await?;
        if let Some(input) = stdin {
            self.data(input).await?;
        }
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.wait().await? {
                russh::ChannelMsg::Data { data } => {
                    return Some(ChannelEvent::Stdout(data.to_vec()));
                }
                russh::ChannelMsg::ExtendedData { data, ext: 1 } => {
                    return Some(ChannelEvent::Stderr(data.to_vec()));
                }
                russh::ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::Exit(exit_status));
                }
                _ => {}
            }
        }
    }
}

#[async_trait::async_trait]
impl Link for Handle<ClientHandler> {
    type Channel = Channel<Msg>;

    async fn open_channel(&self) -> Result<Channel<Msg>, russh::Error> {
        self.channel_open_session().await
    }

    async fn close(&self) -> Result<(), russh::Error> {
        self.disconnect(russh::Disconnect::ByApplication, "", "")
            .await
    }
}

/// Production connector: TCP dial plus key/password authentication.
pub struct SshConnector {
    config: Arc<russh::client::Config>,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            config: Arc::new(russh::client::Config::default()),
        }
    }
}

#[async_trait::async_trait]
impl Connector for SshConnector {
    type Link = Handle<ClientHandler>;

    async fn dial(&self, endpoint: &ServerEndpoint) -> Result<Handle<ClientHandler>, Error> {
        tracing::debug!("Connecting to {}", endpoint.id());
        let mut handle = russh::client::connect(
            self.config.clone(),
            (endpoint.host.as_str(), endpoint.port),
            ClientHandler,
        )
        .await
        .map_err(|source| Error::ConnectionFailed {
            host: endpoint.host.clone(),
            port: endpoint.port,
            source,
        })?;
        auth::authenticate(&mut handle, endpoint).await?;
        Ok(handle)
    }
}

struct Connection<L> {
    generation: u64,
    link: Arc<L>,
}

/// Why a single attempt did not produce an exit status.
enum Attempt {
    /// The remote side went away mid-command; worth retrying.
    Transport(String),
    /// Writing the local sink failed; retrying won't help.
    Local(Error),
}

impl Attempt {
    fn transport(err: russh::Error) -> Self {
        Attempt::Transport(error_chain(&err))
    }
}

struct Captured {
    stdout: Output,
    stderr: String,
    exit_status: u32,
}

enum StdoutSink {
    Buffer(Vec<u8>),
    File {
        path: std::path::PathBuf,
        writer: tokio::io::BufWriter<tokio::fs::File>,
    },
}

impl StdoutSink {
    async fn open(sink: Option<&std::path::Path>) -> Result<Self, Error> {
        match sink {
            None => Ok(StdoutSink::Buffer(Vec::with_capacity(STDOUT_BUFFER_SIZE))),
            Some(path) => {
                let file =
                    tokio::fs::File::create(path)
                        .await
                        .map_err(|source| Error::LocalIo {
                            path: path.to_path_buf(),
                            source,
                        })?;
                Ok(StdoutSink::File {
                    path: path.to_path_buf(),
                    writer: tokio::io::BufWriter::new(file),
                })
            }
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), Error> {
        match self {
            StdoutSink::Buffer(buffer) => {
                buffer.extend_from_slice(data);
                Ok(())
            }
            StdoutSink::File { path, writer } => {
                writer
                    .write_all(data)
                    .await
                    .map_err(|source| Error::LocalIo {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }

    async fn finish(self) -> Result<Output, Error> {
        match self {
            StdoutSink::Buffer(buffer) => Ok(Output::Inline(buffer)),
            StdoutSink::File { path, mut writer } => {
                writer.flush().await.map_err(|source| Error::LocalIo {
                    path: path.clone(),
                    source,
                })?;
                Ok(Output::Spilled(path))
            }
        }
    }
}

pub struct SessionClient<C: Connector = SshConnector> {
    endpoint: ServerEndpoint,
    retry: RetryConfig,
    feed_sudo_password: bool,
    connector: C,
    connection: tokio::sync::Mutex<Connection<C::Link>>,
}

impl<C: Connector> std::fmt::Debug for SessionClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("endpoint", &self.endpoint)
            .field("retry", &self.retry)
            .field("feed_sudo_password", &self.feed_sudo_password)
            .finish()
    }
}

impl SessionClient {
    /// Dials and authenticates; both failures are fatal for the caller.
    #[instrument(skip_all, fields(endpoint = %endpoint.id()))]
    pub async fn connect(endpoint: ServerEndpoint, retry: RetryConfig) -> Result<Self, Error> {
        Self::with_connector(endpoint, retry, SshConnector::default()).await
    }
}

impl<C: Connector> SessionClient<C> {
    pub async fn with_connector(
        endpoint: ServerEndpoint,
        retry: RetryConfig,
        connector: C,
    ) -> Result<Self, Error> {
        endpoint.validate()?;
        let link = connector.dial(&endpoint).await?;
        tracing::info!("Connected to {}", endpoint.id());
        Ok(Self {
            endpoint,
            retry,
            feed_sudo_password: false,
            connector,
            connection: tokio::sync::Mutex::new(Connection {
                generation: 0,
                link: Arc::new(link),
            }),
        })
    }

    /// Write the endpoint password to `sudo -S` on stdin for elevated commands.
    #[must_use]
    pub fn with_sudo_password(mut self, feed: bool) -> Self {
        self.feed_sudo_password = feed;
        self
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    async fn current(&self) -> (u64, Arc<C::Link>) {
        let connection = self.connection.lock().await;
        (connection.generation, connection.link.clone())
    }

    /// Replaces the connection unless another caller already did since `seen_generation`.
    async fn reconnect(&self, seen_generation: u64) -> Result<Arc<C::Link>, Error> {
        let mut connection = self.connection.lock().await;
        if connection.generation != seen_generation {
            return Ok(connection.link.clone());
        }
        tracing::warn!("Reconnecting to {}", self.endpoint.id());
        let link = Arc::new(self.connector.dial(&self.endpoint).await?);
        connection.generation += 1;
        connection.link = link.clone();
        Ok(link)
    }

    /// Opens a channel, reconnecting once if the current connection refuses.
    async fn open_channel(&self) -> Result<ChannelOf<C>, Error> {
        let (generation, link) = self.current().await;
        match link.open_channel().await {
            Ok(channel) => Ok(channel),
            Err(err) => {
                tracing::warn!(
                    "Failed to open a session on {}: {}",
                    self.endpoint.id(),
                    error_chain(&err)
                );
                let link = self.reconnect(generation).await?;
                link.open_channel().await.map_err(|source| Error::Session {
                    host: self.endpoint.host.clone(),
                    port: self.endpoint.port,
                    source,
                })
            }
        }
    }

    async fn drive(
        &self,
        mut channel: ChannelOf<C>,
        command: &str,
        elevate: bool,
        sink: Option<&std::path::Path>,
    ) -> Result<Captured, Attempt> {
        let sudo_input = self
            .endpoint
            .password
            .as_ref()
            .filter(|_| elevate && self.feed_sudo_password)
            .map(|password| Zeroizing::new(format!("{}\n", password.as_str())));
        channel
            .start(command, sudo_input.as_ref().map(|line| line.as_bytes()))
            .await
            .map_err(Attempt::transport)?;
        let mut stdout = StdoutSink::open(sink).await.map_err(Attempt::Local)?;
        let mut stderr = Vec::new();
        let mut exit_status = None;
        while let Some(event) = channel.next_event().await {
            match event {
                ChannelEvent::Stdout(data) => stdout.write(&data).await.map_err(Attempt::Local)?,
                ChannelEvent::Stderr(data) => stderr.extend_from_slice(&data),
                // data may still follow the exit status, keep reading until the channel closes
                ChannelEvent::Exit(status) => exit_status = Some(status),
            }
        }
        let stdout = stdout.finish().await.map_err(Attempt::Local)?;
        match exit_status {
            Some(exit_status) => Ok(Captured {
                stdout,
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
                exit_status,
            }),
            None => Err(Attempt::Transport(
                "channel closed without an exit status".to_string(),
            )),
        }
    }

    async fn attempt(
        &self,
        channel: ChannelOf<C>,
        command: &str,
        elevate: bool,
        sink: Option<&std::path::Path>,
    ) -> Result<Captured, Attempt> {
        let run = self.drive(channel, command, elevate, sink);
        match self.retry.command_timeout {
            None => run.await,
            Some(deadline) => match tokio::time::timeout(deadline, run).await {
                Ok(res) => res,
                Err(_) => Err(Attempt::Transport(format!(
                    "timed out after {}",
                    humantime::format_duration(deadline)
                ))),
            },
        }
    }

    fn result(
        &self,
        command: &str,
        outcome: Outcome,
        stdout: Output,
        stderr: String,
    ) -> ExecutionResult {
        ExecutionResult {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            command: command.to_string(),
            stdout,
            stderr,
            outcome,
        }
    }

    async fn run(
        &self,
        command: &str,
        elevate: bool,
        sink: Option<&std::path::Path>,
    ) -> Result<ExecutionResult, Error> {
        let command = if elevate {
            command::elevate(command)
        } else {
            command.to_string()
        };
        let empty = || match sink {
            Some(path) => Output::Spilled(path.to_path_buf()),
            None => Output::Inline(Vec::new()),
        };
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                host = %self.endpoint.host,
                port = self.endpoint.port,
                attempt,
                "Executing: {}",
                command
            );
            let channel = match self.open_channel().await {
                Ok(channel) => channel,
                Err(err) => {
                    tracing::error!(
                        "Giving up on '{}' on {}: {}",
                        command,
                        self.endpoint.id(),
                        err
                    );
                    let outcome = Outcome::TransportFailure(error_chain(&err));
                    return Ok(self.result(&command, outcome, empty(), String::new()));
                }
            };
            match self.attempt(channel, &command, elevate, sink).await {
                Ok(captured) => {
                    return Ok(self.result(
                        &command,
                        Outcome::Exited(captured.exit_status),
                        captured.stdout,
                        captured.stderr,
                    ));
                }
                Err(Attempt::Local(err)) => return Err(err),
                Err(Attempt::Transport(reason)) if attempt >= max_attempts => {
                    tracing::error!(
                        "Command '{}' on {} failed after {} attempts: {}",
                        command,
                        self.endpoint.id(),
                        attempt,
                        reason
                    );
                    let outcome = Outcome::TransportFailure(format!(
                        "{} (gave up after {} attempts)",
                        reason, attempt
                    ));
                    return Ok(self.result(&command, outcome, empty(), String::new()));
                }
                Err(Attempt::Transport(reason)) => {
                    tracing::warn!(
                        "Command '{}' on {} failed (attempt {}/{}): {}, retrying",
                        command,
                        self.endpoint.id(),
                        attempt,
                        max_attempts,
                        reason
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
            }
        }
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        let (_, link) = self.current().await;
        link.close().await.map_err(|source| Error::Session {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            source,
        })
    }
}

#[async_trait::async_trait]
impl<C: Connector> crate::Executor for SessionClient<C> {
    fn id(&self) -> String {
        self.endpoint.id()
    }

    async fn execute(&self, command: &str, elevate: bool) -> Result<ExecutionResult, Error> {
        self.run(command, elevate, None).await
    }

    async fn execute_with_redirect(
        &self,
        command: &str,
        elevate: bool,
        sink: &std::path::Path,
    ) -> Result<ExecutionResult, Error> {
        self.run(command, elevate, Some(sink)).await
    }
}
