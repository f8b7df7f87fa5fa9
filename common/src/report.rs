//! Streaming comparison report and running summary.

use anyhow::{Context, Result};
use enum_map::{Enum, EnumMap};
use tokio::io::AsyncWriteExt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Enum)]
pub enum EntryKind {
    Unchanged,
    Added,   // present only on the target
    Deleted, // present only on the source
    Modified,
    Error,
}

impl EntryKind {
    pub fn prefix(self) -> &'static str {
        match self {
            EntryKind::Unchanged => "  ",
            EntryKind::Modified => "M ",
            EntryKind::Added => "A ",
            EntryKind::Deleted => "D ",
            EntryKind::Error => "E ",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub counts: EnumMap<EntryKind, u64>,
    pub source: String,
    pub target: String,
    pub targets: Vec<String>,
}

impl Summary {
    pub fn new(source: impl Into<String>, target: impl Into<String>, targets: &[String]) -> Self {
        Self {
            counts: EnumMap::default(),
            source: source.into(),
            target: target.into(),
            targets: targets.to_vec(),
        }
    }

    pub fn record(&mut self, kind: EntryKind) {
        self.counts[kind] += 1;
    }

    /// Entries that were classified, errors excluded.
    pub fn total(&self) -> u64 {
        self.counts[EntryKind::Unchanged] + self.diffs()
    }

    pub fn diffs(&self) -> u64 {
        self.counts[EntryKind::Added]
            + self.counts[EntryKind::Deleted]
            + self.counts[EntryKind::Modified]
    }

    pub fn errors(&self) -> u64 {
        self.counts[EntryKind::Error]
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "Target: {}", self.target)?;
        writeln!(f, "Targets: {}", self.targets.join(" "))?;
        write!(
            f,
            "Compared {} entries, {} differences (added: {}, deleted: {}, modified: {})",
            self.total(),
            self.diffs(),
            self.counts[EntryKind::Added],
            self.counts[EntryKind::Deleted],
            self.counts[EntryKind::Modified],
        )?;
        if self.errors() > 0 {
            write!(f, "\nErrors: {}", self.errors())?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Sinks {
    log: Option<tokio::io::BufWriter<tokio::fs::File>>,
    stdout: Option<tokio::io::Stdout>,
}

/// Writes report lines to stdout and/or a log file.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    sinks: std::sync::Arc<tokio::sync::Mutex<Sinks>>,
}

impl ReportWriter {
    pub async fn new(log_path_opt: Option<&std::path::Path>, use_stdout: bool) -> Result<Self> {
        let log = match log_path_opt {
            Some(log_path) => {
                let log_file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(log_path)
                    .await
                    .with_context(|| format!("Failed to open log file: {:?}", log_path))?;
                Some(tokio::io::BufWriter::new(log_file))
            }
            None => None,
        };
        let stdout = use_stdout.then(tokio::io::stdout);
        Ok(Self {
            sinks: std::sync::Arc::new(tokio::sync::Mutex::new(Sinks { log, stdout })),
        })
    }

    pub async fn write_line(&self, line: &str) -> Result<()> {
        let mut sinks = self.sinks.lock().await;
        let msg = format!("{}\n", line);
        if let Some(stdout) = &mut sinks.stdout {
            stdout
                .write_all(msg.as_bytes())
                .await
                .context("Failed to write to stdout")?;
        }
        if let Some(log) = &mut sinks.log {
            log.write_all(msg.as_bytes())
                .await
                .context("Failed to write to log file")?;
        }
        Ok(())
    }

    pub async fn header(&self, source: &str, target: &str) -> Result<()> {
        self.write_line(&format!("Comparing {} -> {}", source, target))
            .await
    }

    pub async fn entry(&self, kind: EntryKind, path: &str) -> Result<()> {
        self.write_line(&format!("{}{}", kind.prefix(), path)).await
    }

    pub async fn error(&self, path: &str, message: &str) -> Result<()> {
        self.write_line(&format!("{}{}: {}", EntryKind::Error.prefix(), path, message))
            .await
    }

    pub async fn detail(&self, lines: &[String]) -> Result<()> {
        for line in lines {
            self.write_line(line).await?;
        }
        Ok(())
    }

    pub async fn summary(&self, summary: &Summary) -> Result<()> {
        for line in summary.to_string().lines() {
            self.write_line(line).await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        let mut sinks = self.sinks.lock().await;
        if let Some(stdout) = &mut sinks.stdout {
            stdout.flush().await.context("Failed to flush stdout")?;
        }
        if let Some(log) = &mut sinks.log {
            log.flush().await.context("Failed to flush log file")?;
        }
        Ok(())
    }
}
