use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "rtcmp",
    version,
    about = "Compare the file trees of two remote hosts over SSH",
    long_about = "`rtcmp` compares the file trees of two remote hosts over SSH.

Nothing needs to be installed on the remote hosts: a POSIX shell with find, sort,
stat, md5sum, file, wc and awk is enough. Paths present on only one side are
reported as added or deleted, paths present on both are compared by permissions,
ownership and content.

The source host is the baseline:
    '  ' unchanged
    'M ' modified (permissions, ownership or content differ)
    'A ' added (present only on the target)
    'D ' deleted (present only on the source)
    'E ' the path could not be compared

EXIT CODES:
    0 - Comparison completed (differences and per-file errors do not change this)
    1 - Fatal error (connection, authentication, listing or local I/O failure)

EXAMPLES:
    # Compare /etc on two hosts, with line diffs for modified text files
    rtcmp --src-host web1 --src-user ops --tgt-host web2 --tgt-user ops \\
          --src-key-path ~/.ssh/id_ed25519 --tgt-key-path ~/.ssh/id_ed25519 \\
          --targets /etc --detail

    # Skip git metadata and write the report to a file
    rtcmp --src-host a --src-user ops --tgt-host b --tgt-user ops \\
          --targets /srv/app --excludes '*/.git/*' --log compare.log"
)]
struct Args {
    // Comparison options
    /// Root paths to compare on both hosts
    #[arg(
        long,
        num_args = 1..,
        required = true,
        value_name = "PATH",
        help_heading = "Comparison options"
    )]
    targets: Vec<String>,

    /// `find -path` patterns to leave out of the listings
    #[arg(long, num_args = 1.., value_name = "PATTERN", help_heading = "Comparison options")]
    excludes: Vec<String>,

    /// Print line diffs for modified entries
    #[arg(long, help_heading = "Comparison options")]
    detail: bool,

    /// Exit on the first path that could not be compared
    #[arg(short = 'e', long = "fail-early", help_heading = "Comparison options")]
    fail_early: bool,

    /// File to store the report (instead of stdout)
    #[arg(long, value_name = "PATH", help_heading = "Comparison options")]
    log: Option<std::path::PathBuf>,

    // Source host
    /// Source host name or address
    #[arg(long, value_name = "HOST", help_heading = "Source host")]
    src_host: String,

    /// Source SSH port
    #[arg(
        long,
        default_value_t = remote::DEFAULT_SSH_PORT,
        value_name = "PORT",
        help_heading = "Source host"
    )]
    src_port: u16,

    /// Source login user
    #[arg(long, value_name = "USER", help_heading = "Source host")]
    src_user: String,

    /// Source login password
    #[arg(
        long,
        env = "RTCMP_SRC_PASS",
        hide_env_values = true,
        value_name = "PASSWORD",
        help_heading = "Source host"
    )]
    src_pass: Option<String>,

    /// Private key used to log into the source, tried before the password
    #[arg(long, value_name = "PATH", help_heading = "Source host")]
    src_key_path: Option<std::path::PathBuf>,

    /// Passphrase of the source private key
    #[arg(
        long,
        env = "RTCMP_SRC_KEY_PASS",
        hide_env_values = true,
        value_name = "PASSPHRASE",
        help_heading = "Source host"
    )]
    src_key_pass: Option<String>,

    // Target host
    /// Target host name or address
    #[arg(long, value_name = "HOST", help_heading = "Target host")]
    tgt_host: String,

    /// Target SSH port
    #[arg(
        long,
        default_value_t = remote::DEFAULT_SSH_PORT,
        value_name = "PORT",
        help_heading = "Target host"
    )]
    tgt_port: u16,

    /// Target login user
    #[arg(long, value_name = "USER", help_heading = "Target host")]
    tgt_user: String,

    /// Target login password
    #[arg(
        long,
        env = "RTCMP_TGT_PASS",
        hide_env_values = true,
        value_name = "PASSWORD",
        help_heading = "Target host"
    )]
    tgt_pass: Option<String>,

    /// Private key used to log into the target, tried before the password
    #[arg(long, value_name = "PATH", help_heading = "Target host")]
    tgt_key_path: Option<std::path::PathBuf>,

    /// Passphrase of the target private key
    #[arg(
        long,
        env = "RTCMP_TGT_KEY_PASS",
        hide_env_values = true,
        value_name = "PASSPHRASE",
        help_heading = "Target host"
    )]
    tgt_key_pass: Option<String>,

    // Remote execution
    /// Run remote commands as the login user instead of through `sudo`
    #[arg(long, help_heading = "Remote execution")]
    no_elevate: bool,

    /// Answer the `sudo` password prompt with the login password
    #[arg(long, help_heading = "Remote execution")]
    sudo_password: bool,

    /// Attempts per remote command when the channel fails without an exit status
    #[arg(long, default_value = "3", value_name = "N", help_heading = "Remote execution")]
    max_attempts: u32,

    /// Base delay between attempts, multiplied by the attempt number
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, default_value = "500ms", value_name = "DELAY", help_heading = "Remote execution")]
    retry_backoff: humantime::Duration,

    /// Deadline for a single remote command attempt, no deadline by default
    ///
    /// This option accepts a human readable duration, e.g. "30s", "5min" etc.
    #[arg(long, value_name = "TIMEOUT", help_heading = "Remote execution")]
    command_timeout: Option<humantime::Duration>,

    // Progress & output
    /// Verbose level: -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help_heading = "Progress & output"
    )]
    verbose: u8,

    /// Quiet mode, suppress the report on stdout and error messages on stderr
    ///
    /// When used with --log, the report is still written to the log file.
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Directory in which the scratch directory for listings is created
    #[arg(long, value_name = "PATH", help_heading = "Advanced settings")]
    tmp_dir: Option<std::path::PathBuf>,

    /// File to write debug logs to (instead of stderr)
    #[arg(long, value_name = "PATH", help_heading = "Advanced settings")]
    debug_log: Option<std::path::PathBuf>,

    /// Number of worker threads, 0 means number of cores
    #[arg(long, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(long, default_value = "0", value_name = "N", help_heading = "Advanced settings")]
    max_blocking_threads: usize,
}

fn endpoint(
    host: &str,
    port: u16,
    user: &str,
    password: Option<&String>,
    key_path: Option<&std::path::PathBuf>,
    key_passphrase: Option<&String>,
) -> remote::ServerEndpoint {
    let mut endpoint = remote::ServerEndpoint::new(host, Some(port), user);
    if let Some(password) = password {
        endpoint = endpoint.with_password(password.as_str());
    }
    if let Some(key_path) = key_path {
        endpoint = endpoint.with_key_file(key_path, key_passphrase.cloned());
    }
    endpoint
}

async fn connect(
    endpoint: remote::ServerEndpoint,
    retry: remote::RetryConfig,
    sudo_password: bool,
) -> Result<remote::SessionClient> {
    let id = endpoint.id();
    let client = remote::SessionClient::connect(endpoint, retry)
        .await
        .with_context(|| format!("Failed to establish a session with {}", id))?;
    Ok(client.with_sudo_password(sudo_password))
}

async fn async_main(args: Args) -> Result<common::Summary> {
    // output to stdout if no log file and not quiet
    let use_stdout = args.log.is_none() && !args.quiet;
    let report = common::ReportWriter::new(args.log.as_deref(), use_stdout).await?;
    let scratch_dir = match &args.tmp_dir {
        Some(dir) => tempfile::Builder::new().prefix("rtcmp-").tempdir_in(dir),
        None => tempfile::Builder::new().prefix("rtcmp-").tempdir(),
    }
    .context("Failed to create scratch directory")?;
    let retry = remote::RetryConfig {
        max_attempts: args.max_attempts,
        backoff: args.retry_backoff.into(),
        command_timeout: args.command_timeout.map(Into::into),
    };
    let source = endpoint(
        &args.src_host,
        args.src_port,
        &args.src_user,
        args.src_pass.as_ref(),
        args.src_key_path.as_ref(),
        args.src_key_pass.as_ref(),
    );
    let target = endpoint(
        &args.tgt_host,
        args.tgt_port,
        &args.tgt_user,
        args.tgt_pass.as_ref(),
        args.tgt_key_path.as_ref(),
        args.tgt_key_pass.as_ref(),
    );
    let (source, target) = tokio::try_join!(
        connect(source, retry, args.sudo_password),
        connect(target, retry, args.sudo_password)
    )?;
    let (source, target) = (Arc::new(source), Arc::new(target));
    let settings = rtcmp::CompareSettings {
        targets: args.targets.clone(),
        excludes: args.excludes.clone(),
        detail: args.detail,
        elevate: !args.no_elevate,
        fail_early: args.fail_early,
    };
    let res = rtcmp::compare(
        source.clone(),
        target.clone(),
        &settings,
        scratch_dir.path(),
        &report,
    )
    .await;
    for client in [&source, &target] {
        if let Err(err) = client.disconnect().await {
            tracing::warn!("Failed to disconnect from {}: {}", client.endpoint().id(), err);
        }
    }
    report.flush().await?;
    let summary = res?;
    scratch_dir
        .close()
        .context("Failed to remove scratch directory")?;
    Ok(summary)
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let tracing = common::TracingConfig {
        debug_log_file: args.debug_log,
    };
    match common::run(output, runtime, tracing, func) {
        Some(_summary) => std::process::exit(0),
        None => std::process::exit(1),
    }
}
