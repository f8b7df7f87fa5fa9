use std::path::{Path, PathBuf};

use crate::{Error, Executor, command};

/// Streams the sorted listing of `targets` on `executor` into `<scratch_dir>/<label>.list`.
///
/// A non-zero exit (e.g. one of the targets does not exist) still yields whatever
/// `find` managed to print. Only a transport failure is an error.
pub async fn retrieve_listing<E: Executor + ?Sized>(
    executor: &E,
    targets: &[String],
    excludes: &[String],
    elevate: bool,
    scratch_dir: &Path,
    label: &str,
) -> Result<PathBuf, Error> {
    let cmd = command::list(targets, excludes)?;
    let sink = scratch_dir.join(format!("{label}.list"));
    tracing::debug!("Retrieving {} listing from {} into {:?}", label, executor.id(), sink);
    let res = executor
        .execute_with_redirect(&cmd, elevate, &sink)
        .await?
        .ensure_completed()?;
    if res.exit_status() != 0 {
        tracing::warn!(
            "Listing on {} exited with status {}, the listing may be partial: {}",
            executor.id(),
            res.exit_status(),
            res.stderr.trim()
        );
    }
    Ok(sink)
}
