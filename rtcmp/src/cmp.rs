//! Sorted merge-join of two remote listings.

use anyhow::{Context, Result, anyhow};
use common::{EntryKind, ReportWriter, Summary, linediff};
use remote::{Executor, command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct CompareSettings {
    pub targets: Vec<String>,
    pub excludes: Vec<String>,
    /// Print line diffs for modified entries
    pub detail: bool,
    /// Run every remote command through sudo
    pub elevate: bool,
    /// Abort on the first per-file error instead of reporting it and moving on
    pub fail_early: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ModifiedReason {
    StatDiffers,
    ContentDiffers,
}

/// Classification of a single path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComparisonOutcome {
    Unchanged(String),
    Added(String),   // present only on the target
    Deleted(String), // present only on the source
    Modified {
        path: String,
        reason: ModifiedReason,
        // the pair of outputs that differ, stat output takes precedence over content
        source: Vec<u8>,
        target: Vec<u8>,
    },
    Failed {
        path: String,
        message: String,
    },
}

impl ComparisonOutcome {
    pub fn kind(&self) -> EntryKind {
        match self {
            ComparisonOutcome::Unchanged(_) => EntryKind::Unchanged,
            ComparisonOutcome::Added(_) => EntryKind::Added,
            ComparisonOutcome::Deleted(_) => EntryKind::Deleted,
            ComparisonOutcome::Modified { .. } => EntryKind::Modified,
            ComparisonOutcome::Failed { .. } => EntryKind::Error,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ComparisonOutcome::Unchanged(path)
            | ComparisonOutcome::Added(path)
            | ComparisonOutcome::Deleted(path)
            | ComparisonOutcome::Modified { path, .. }
            | ComparisonOutcome::Failed { path, .. } => path,
        }
    }
}

/// Sorted paths as raw bytes, the order `LC_ALL=C sort` produced them in.
struct Listing {
    path: PathBuf,
    reader: tokio::io::BufReader<tokio::fs::File>,
    line: Vec<u8>,
}

impl Listing {
    async fn open(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open listing {:?}", &path))?;
        Ok(Self {
            path,
            reader: tokio::io::BufReader::new(file),
            line: Vec::new(),
        })
    }

    async fn next(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .await
                .with_context(|| format!("Failed reading listing {:?}", &self.path))?;
            if read == 0 {
                return Ok(None);
            }
            let line = self.line.as_slice();
            let line = line.strip_suffix(b"\n").unwrap_or(line);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if !line.is_empty() {
                return Ok(Some(line.to_vec()));
            }
        }
    }
}

fn display_path(raw: Vec<u8>) -> String {
    String::from_utf8(raw)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

async fn fetch_listings<S, T>(
    source: &Arc<S>,
    target: &Arc<T>,
    settings: &CompareSettings,
    scratch_dir: &Path,
) -> Result<(PathBuf, PathBuf)>
where
    S: Executor + 'static,
    T: Executor + 'static,
{
    let source_task = {
        let source = source.clone();
        let targets = settings.targets.clone();
        let excludes = settings.excludes.clone();
        let scratch_dir = scratch_dir.to_path_buf();
        let elevate = settings.elevate;
        tokio::spawn(async move {
            remote::retrieve_listing(
                source.as_ref(),
                &targets,
                &excludes,
                elevate,
                &scratch_dir,
                "source",
            )
            .await
        })
    };
    let target_task = {
        let target = target.clone();
        let targets = settings.targets.clone();
        let excludes = settings.excludes.clone();
        let scratch_dir = scratch_dir.to_path_buf();
        let elevate = settings.elevate;
        tokio::spawn(async move {
            remote::retrieve_listing(
                target.as_ref(),
                &targets,
                &excludes,
                elevate,
                &scratch_dir,
                "target",
            )
            .await
        })
    };
    let (source_res, target_res) = tokio::join!(source_task, target_task);
    let source_listing = source_res
        .context("Source listing task failed")?
        .with_context(|| format!("Failed to retrieve listing from {}", source.id()))?;
    let target_listing = target_res
        .context("Target listing task failed")?
        .with_context(|| format!("Failed to retrieve listing from {}", target.id()))?;
    Ok((source_listing, target_listing))
}

fn file_commands(path: &str) -> Result<(String, String), command::CommandError> {
    Ok((command::stat(path)?, command::fingerprint(path)?))
}

/// Fetches stat and fingerprint of `path` from both hosts and classifies the pair.
async fn check_path<S, T>(
    source: &S,
    target: &T,
    path: String,
    elevate: bool,
) -> Result<ComparisonOutcome>
where
    S: Executor + ?Sized,
    T: Executor + ?Sized,
{
    let (stat_cmd, fingerprint_cmd) = match file_commands(&path) {
        Ok(commands) => commands,
        Err(err) => {
            return Ok(ComparisonOutcome::Failed {
                path,
                message: err.to_string(),
            });
        }
    };
    let (source_stat, target_stat, source_fingerprint, target_fingerprint) = tokio::join!(
        source.execute(&stat_cmd, elevate),
        target.execute(&stat_cmd, elevate),
        source.execute(&fingerprint_cmd, elevate),
        target.execute(&fingerprint_cmd, elevate)
    );
    let completed = [
        source_stat?,
        target_stat?,
        source_fingerprint?,
        target_fingerprint?,
    ]
    .map(remote::ExecutionResult::ensure_completed);
    let [source_stat, target_stat, source_fingerprint, target_fingerprint] = match completed {
        [Ok(a), Ok(b), Ok(c), Ok(d)] => [a, b, c, d],
        failed => {
            let message = failed
                .into_iter()
                .filter_map(Result::err)
                .map(|err| err.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Ok(ComparisonOutcome::Failed { path, message });
        }
    };
    let (reason, old, new) = if source_stat.stdout_bytes() != target_stat.stdout_bytes() {
        (ModifiedReason::StatDiffers, source_stat, target_stat)
    } else if source_fingerprint.stdout_bytes() != target_fingerprint.stdout_bytes() {
        (
            ModifiedReason::ContentDiffers,
            source_fingerprint,
            target_fingerprint,
        )
    } else {
        return Ok(ComparisonOutcome::Unchanged(path));
    };
    tracing::debug!("{}: {:?}", path, reason);
    Ok(ComparisonOutcome::Modified {
        path,
        reason,
        source: old.stdout_bytes().to_vec(),
        target: new.stdout_bytes().to_vec(),
    })
}

async fn emit(
    outcome: ComparisonOutcome,
    settings: &CompareSettings,
    report: &ReportWriter,
    summary: &mut Summary,
) -> Result<()> {
    summary.record(outcome.kind());
    match outcome {
        ComparisonOutcome::Failed { path, message } => {
            tracing::error!("{}: {}", path, message);
            report.error(&path, &message).await?;
            if settings.fail_early {
                return Err(anyhow!("{}: {}", path, message));
            }
        }
        ComparisonOutcome::Modified {
            path,
            source,
            target,
            ..
        } => {
            report.entry(EntryKind::Modified, &path).await?;
            if settings.detail {
                let lines = linediff::diff(&source, &target)
                    .with_context(|| format!("Failed to diff {}", path))?;
                report.detail(&lines).await?;
            }
        }
        outcome => report.entry(outcome.kind(), outcome.path()).await?,
    }
    Ok(())
}

/// Compares the trees under `settings.targets` on `source` and `target`.
///
/// Entries are reported in ascending path order as they are classified, followed
/// by the summary block. Listings are spilled into `scratch_dir`.
#[instrument(skip_all, fields(source = %source.id(), target = %target.id()))]
pub async fn compare<S, T>(
    source: Arc<S>,
    target: Arc<T>,
    settings: &CompareSettings,
    scratch_dir: &Path,
    report: &ReportWriter,
) -> Result<Summary>
where
    S: Executor + 'static,
    T: Executor + 'static,
{
    let mut summary = Summary::new(source.id(), target.id(), &settings.targets);
    report.header(&source.id(), &target.id()).await?;
    let (source_listing, target_listing) =
        fetch_listings(&source, &target, settings, scratch_dir).await?;
    let mut source_listing = Listing::open(source_listing).await?;
    let mut target_listing = Listing::open(target_listing).await?;
    let mut source_path = source_listing.next().await?;
    let mut target_path = target_listing.next().await?;
    loop {
        let outcome = match (source_path.take(), target_path.take()) {
            (None, None) => break,
            (Some(src), None) => {
                source_path = source_listing.next().await?;
                ComparisonOutcome::Deleted(display_path(src))
            }
            (None, Some(tgt)) => {
                target_path = target_listing.next().await?;
                ComparisonOutcome::Added(display_path(tgt))
            }
            (Some(src), Some(tgt)) => match src.cmp(&tgt) {
                std::cmp::Ordering::Equal => {
                    let outcome = match String::from_utf8(src) {
                        Ok(path) => {
                            check_path(source.as_ref(), target.as_ref(), path, settings.elevate)
                                .await?
                        }
                        // remote commands are built as text, such a path cannot be quoted into one
                        Err(err) => ComparisonOutcome::Failed {
                            path: String::from_utf8_lossy(err.as_bytes()).into_owned(),
                            message: "path is not valid UTF-8".to_string(),
                        },
                    };
                    source_path = source_listing.next().await?;
                    target_path = target_listing.next().await?;
                    outcome
                }
                std::cmp::Ordering::Less => {
                    target_path = Some(tgt);
                    source_path = source_listing.next().await?;
                    ComparisonOutcome::Deleted(display_path(src))
                }
                std::cmp::Ordering::Greater => {
                    source_path = Some(src);
                    target_path = target_listing.next().await?;
                    ComparisonOutcome::Added(display_path(tgt))
                }
            },
        };
        emit(outcome, settings, report, &mut summary).await?;
    }
    report.summary(&summary).await?;
    tracing::info!(
        "Compared {} entries, {} differences, {} errors",
        summary.total(),
        summary.diffs(),
        summary.errors()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use remote::{ExecutionResult, Outcome, Output};
    use std::collections::{BTreeSet, HashMap};
    use tracing_test::traced_test;

    const ROOT_644: &str = "-rw-r--r-- 0 root 0 root\n";
    const ROOT_600: &str = "-rw------- 0 root 0 root\n";

    /// In-memory host answering the exact commands the engine renders.
    struct FakeHost {
        id: String,
        listing_command: String,
        files: BTreeSet<Vec<u8>>,
        responses: HashMap<String, Outcome>,
        stdout: HashMap<String, Vec<u8>>,
        executed: std::sync::Mutex<Vec<String>>,
    }

    impl FakeHost {
        fn new(id: &str, targets: &[&str]) -> Self {
            let targets: Vec<String> = targets.iter().map(|s| s.to_string()).collect();
            Self {
                id: id.to_string(),
                listing_command: command::list(&targets, &[]).unwrap(),
                files: BTreeSet::new(),
                responses: HashMap::new(),
                stdout: HashMap::new(),
                executed: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn file(mut self, path: &str, stat: &str, content: impl AsRef<[u8]>) -> Self {
            self.files.insert(path.as_bytes().to_vec());
            self.answer(command::stat(path).unwrap(), stat.as_bytes());
            self.answer(command::fingerprint(path).unwrap(), content.as_ref());
            self
        }

        /// Lists `path` without answering any command for it.
        fn listed(mut self, path: &[u8]) -> Self {
            self.files.insert(path.to_vec());
            self
        }

        fn answer(&mut self, cmd: String, stdout: &[u8]) {
            self.responses.insert(cmd.clone(), Outcome::Exited(0));
            self.stdout.insert(cmd, stdout.to_vec());
        }

        fn fail(mut self, cmd: String) -> Self {
            self.responses
                .insert(cmd, Outcome::TransportFailure("channel reset".to_string()));
            self
        }

        fn result(&self, command: &str, stdout: Output, outcome: Outcome) -> ExecutionResult {
            ExecutionResult {
                host: self.id.clone(),
                port: 22,
                command: command.to_string(),
                stdout,
                stderr: String::new(),
                outcome,
            }
        }
    }

    #[async_trait::async_trait]
    impl Executor for FakeHost {
        fn id(&self) -> String {
            format!("test@{}:22", self.id)
        }

        async fn execute(
            &self,
            command: &str,
            _elevate: bool,
        ) -> Result<ExecutionResult, remote::Error> {
            self.executed.lock().unwrap().push(command.to_string());
            let outcome = self
                .responses
                .get(command)
                .cloned()
                .unwrap_or_else(|| panic!("unexpected command on {}: {}", self.id, command));
            let stdout = self.stdout.get(command).cloned().unwrap_or_default();
            Ok(self.result(command, Output::Inline(stdout), outcome))
        }

        async fn execute_with_redirect(
            &self,
            command: &str,
            _elevate: bool,
            sink: &Path,
        ) -> Result<ExecutionResult, remote::Error> {
            assert_eq!(command, self.listing_command);
            let mut listing = Vec::new();
            for path in &self.files {
                // the pty may leave carriage returns behind
                listing.extend_from_slice(path);
                listing.extend_from_slice(b"\r\n");
            }
            std::fs::write(sink, listing).unwrap();
            Ok(self.result(command, Output::Spilled(sink.to_path_buf()), Outcome::Exited(0)))
        }
    }

    fn settings(targets: &[&str], detail: bool) -> CompareSettings {
        CompareSettings {
            targets: targets.iter().map(|s| s.to_string()).collect(),
            detail,
            ..Default::default()
        }
    }

    async fn run_compare(
        source: FakeHost,
        target: FakeHost,
        settings: &CompareSettings,
    ) -> Result<(Summary, String)> {
        let tmp_dir = tempfile::tempdir()?;
        let log_path = tmp_dir.path().join("report.log");
        let report = ReportWriter::new(Some(&log_path), false).await?;
        let res = compare(
            Arc::new(source),
            Arc::new(target),
            settings,
            tmp_dir.path(),
            &report,
        )
        .await;
        report.flush().await?;
        let content = tokio::fs::read_to_string(&log_path).await?;
        Ok((res?, content))
    }

    fn entries(report: &str) -> Vec<&str> {
        report
            .lines()
            .filter(|line| {
                ["  ", "M ", "A ", "D ", "E "]
                    .iter()
                    .any(|prefix| line.starts_with(prefix))
            })
            .collect()
    }

    #[tokio::test]
    #[traced_test]
    async fn added_deleted_and_unchanged() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"])
            .file("/srv/a.txt", ROOT_644, "hello\n")
            .file("/srv/b.txt", ROOT_644, "only here\n");
        let target = FakeHost::new("tgt", &["/srv"])
            .file("/srv/a.txt", ROOT_644, "hello\n")
            .file("/srv/c.txt", ROOT_644, "new\n");
        let (summary, report) = run_compare(source, target, &settings(&["/srv"], false)).await?;
        assert_eq!(
            entries(&report),
            vec!["  /srv/a.txt", "D /srv/b.txt", "A /srv/c.txt"]
        );
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.counts[EntryKind::Added], 1);
        assert_eq!(summary.counts[EntryKind::Deleted], 1);
        assert_eq!(summary.counts[EntryKind::Modified], 0);
        assert!(report.starts_with("Comparing test@src:22 -> test@tgt:22\n"));
        assert!(report.ends_with(
            "Compared 3 entries, 2 differences (added: 1, deleted: 1, modified: 0)\n"
        ));
        Ok(())
    }

    #[tokio::test]
    async fn identical_trees_are_all_unchanged() -> Result<()> {
        let build = |id| {
            FakeHost::new(id, &["/etc", "/opt"])
                .file("/etc", "drwxr-xr-x 0 root 0 root\n", "abc  /etc\n")
                .file("/etc/hosts", ROOT_644, "127.0.0.1 localhost\n")
                .file("/opt", "drwxr-xr-x 0 root 0 root\n", "def  /opt\n")
        };
        let (summary, report) =
            run_compare(build("src"), build("tgt"), &settings(&["/etc", "/opt"], true)).await?;
        assert_eq!(
            entries(&report),
            vec!["  /etc", "  /etc/hosts", "  /opt"]
        );
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.diffs(), 0);
        assert!(report.contains("Targets: /etc /opt\n"));
        Ok(())
    }

    #[tokio::test]
    async fn content_change_prints_line_diff() -> Result<()> {
        let source = FakeHost::new("src", &["/etc"]).file(
            "/etc/motd",
            ROOT_644,
            "welcome\nversion 1\nbye\n",
        );
        let target = FakeHost::new("tgt", &["/etc"]).file(
            "/etc/motd",
            ROOT_644,
            "welcome\nversion 2\nbye\n",
        );
        let (summary, report) = run_compare(source, target, &settings(&["/etc"], true)).await?;
        assert_eq!(summary.counts[EntryKind::Modified], 1);
        assert!(
            report.contains("M /etc/motd\n> version 1\n< version 2\n"),
            "{report}"
        );
        assert!(!report.contains("welcome"));
        Ok(())
    }

    #[tokio::test]
    async fn stat_difference_takes_precedence() -> Result<()> {
        let source =
            FakeHost::new("src", &["/etc"]).file("/etc/shadow", ROOT_600, "secret 1\n");
        let target =
            FakeHost::new("tgt", &["/etc"]).file("/etc/shadow", ROOT_644, "secret 2\n");
        let (summary, report) = run_compare(source, target, &settings(&["/etc"], true)).await?;
        assert_eq!(summary.counts[EntryKind::Modified], 1);
        assert!(report.contains(&format!(
            "M /etc/shadow\n> {}< {}",
            ROOT_600, ROOT_644
        )));
        assert!(!report.contains("secret"));
        Ok(())
    }

    #[tokio::test]
    async fn without_detail_only_the_entry_is_printed() -> Result<()> {
        let source = FakeHost::new("src", &["/etc"]).file("/etc/motd", ROOT_644, "a\n");
        let target = FakeHost::new("tgt", &["/etc"]).file("/etc/motd", ROOT_644, "b\n");
        let (_, report) = run_compare(source, target, &settings(&["/etc"], false)).await?;
        assert_eq!(entries(&report), vec!["M /etc/motd"]);
        assert!(!report.contains("> a"));
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn transport_failure_is_reported_inline() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .file("/srv/b", ROOT_644, "b\n")
            .file("/srv/c", ROOT_644, "c\n")
            .fail(command::stat("/srv/b").unwrap());
        let target = FakeHost::new("tgt", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .file("/srv/b", ROOT_644, "b\n")
            .file("/srv/c", ROOT_644, "changed\n");
        let (summary, report) = run_compare(source, target, &settings(&["/srv"], false)).await?;
        let lines = entries(&report);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "  /srv/a");
        assert!(lines[1].starts_with("E /srv/b: "), "{}", lines[1]);
        assert!(lines[1].contains("src:22"), "{}", lines[1]);
        assert!(lines[1].contains("stat -c"), "{}", lines[1]);
        assert!(lines[1].contains("channel reset"), "{}", lines[1]);
        assert_eq!(lines[2], "M /srv/c");
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.total(), 2);
        assert!(report.ends_with("Errors: 1\n"));
        assert!(logs_contain("channel reset"));
        Ok(())
    }

    #[tokio::test]
    async fn fail_early_aborts_on_first_error() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .file("/srv/b", ROOT_644, "b\n")
            .fail(command::fingerprint("/srv/a").unwrap());
        let target = FakeHost::new("tgt", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .file("/srv/b", ROOT_644, "b\n");
        let settings = CompareSettings {
            fail_early: true,
            ..settings(&["/srv"], false)
        };
        assert!(run_compare(source, target, &settings).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn path_with_quote_is_an_inline_error() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .listed(b"/srv/it's");
        let target = FakeHost::new("tgt", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .listed(b"/srv/it's");
        let (summary, report) = run_compare(source, target, &settings(&["/srv"], false)).await?;
        assert_eq!(summary.errors(), 1);
        assert!(report.contains("E /srv/it's: "), "{report}");
        Ok(())
    }

    #[tokio::test]
    async fn content_differing_only_in_non_utf8_bytes_is_modified() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"]).file("/srv/menu", ROOT_644, b"caf\xe9\n");
        let target = FakeHost::new("tgt", &["/srv"]).file("/srv/menu", ROOT_644, b"caf\xe8\n");
        let (summary, report) = run_compare(source, target, &settings(&["/srv"], true)).await?;
        assert_eq!(entries(&report), vec!["M /srv/menu"]);
        assert_eq!(summary.counts[EntryKind::Modified], 1);
        assert!(
            report.contains("M /srv/menu\n> caf\u{FFFD}\n< caf\u{FFFD}\n"),
            "{report}"
        );
        Ok(())
    }

    #[tokio::test]
    async fn non_utf8_file_names_do_not_abort() -> Result<()> {
        let source = FakeHost::new("src", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .listed(b"/srv/caf\xe9")
            .listed(b"/srv/only\xff")
            .file("/srv/z", ROOT_644, "z\n");
        let target = FakeHost::new("tgt", &["/srv"])
            .file("/srv/a", ROOT_644, "a\n")
            .listed(b"/srv/caf\xe9")
            .file("/srv/z", ROOT_644, "z\n");
        let (summary, report) = run_compare(source, target, &settings(&["/srv"], false)).await?;
        assert_eq!(
            entries(&report),
            vec![
                "  /srv/a",
                "E /srv/caf\u{FFFD}: path is not valid UTF-8",
                "D /srv/only\u{FFFD}",
                "  /srv/z",
            ]
        );
        assert_eq!(summary.errors(), 1);
        assert_eq!(summary.counts[EntryKind::Deleted], 1);
        Ok(())
    }

    #[tokio::test]
    async fn fetches_all_four_for_shared_paths_only() -> Result<()> {
        let source = Arc::new(FakeHost::new("src", &["/srv"]).file("/srv/a", ROOT_644, "a\n"));
        let target = Arc::new(
            FakeHost::new("tgt", &["/srv"])
                .file("/srv/a", ROOT_644, "a\n")
                .file("/srv/z", ROOT_644, "z\n"),
        );
        let tmp_dir = tempfile::tempdir()?;
        let report = ReportWriter::new(None, false).await?;
        compare(
            source.clone(),
            target.clone(),
            &settings(&["/srv"], false),
            tmp_dir.path(),
            &report,
        )
        .await?;
        let mut expected = vec![
            command::stat("/srv/a").unwrap(),
            command::fingerprint("/srv/a").unwrap(),
        ];
        expected.sort();
        let mut executed = source.executed.lock().unwrap().clone();
        executed.sort();
        assert_eq!(executed, expected);
        let mut executed = target.executed.lock().unwrap().clone();
        executed.sort();
        assert_eq!(executed, expected);
        Ok(())
    }

    mod merge_join {
        use super::*;
        use proptest::prelude::*;

        fn host(id: &str, paths: &BTreeSet<String>) -> FakeHost {
            paths
                .iter()
                .fold(FakeHost::new(id, &["/"]), |host, path| {
                    host.file(path, ROOT_644, "same\n")
                })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn partitions_union_in_sorted_order(
                source_paths in proptest::collection::btree_set("/[a-d]{1,3}", 0..12),
                target_paths in proptest::collection::btree_set("/[a-d]{1,3}", 0..12),
            ) {
                let runtime = tokio::runtime::Runtime::new().unwrap();
                let (summary, report) = runtime
                    .block_on(run_compare(
                        host("src", &source_paths),
                        host("tgt", &target_paths),
                        &settings(&["/"], false),
                    ))
                    .unwrap();
                let expected: Vec<String> = source_paths
                    .union(&target_paths)
                    .map(|path| {
                        let on_source = source_paths.contains(path);
                        let on_target = target_paths.contains(path);
                        let prefix = match (on_source, on_target) {
                            (true, true) => "  ",
                            (true, false) => "D ",
                            _ => "A ",
                        };
                        format!("{prefix}{path}")
                    })
                    .collect();
                let expected_entries: Vec<&str> = expected.iter().map(String::as_str).collect();
                prop_assert_eq!(entries(&report), expected_entries);
                prop_assert_eq!(summary.total() as usize, expected.len());
                prop_assert_eq!(
                    summary.counts[EntryKind::Deleted] as usize,
                    source_paths.difference(&target_paths).count()
                );
                prop_assert_eq!(
                    summary.counts[EntryKind::Added] as usize,
                    target_paths.difference(&source_paths).count()
                );
            }
        }
    }
}
