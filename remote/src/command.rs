//! Shell command construction for the remote side.
//!
//! Every path or pattern is wrapped in a single pair of single quotes. Values
//! that contain a single quote themselves are rejected instead of escaped.

/// `stat` format used as the metadata comparison key: permissions, gid, group, uid, user.
pub const STAT_FORMAT: &str = "%A %g %G %u %U";

/// Text files below this size are fetched verbatim so they can be line diffed.
pub const INLINE_CONTENT_LIMIT: u64 = 512_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("{0:?} contains a single quote and cannot be passed to the remote shell")]
    EmbeddedQuote(String),
    #[error("at least one target path is required")]
    NoTargets,
}

pub fn quote(value: &str) -> Result<String, CommandError> {
    if value.contains('\'') {
        return Err(CommandError::EmbeddedQuote(value.to_string()));
    }
    Ok(format!("'{}'", value))
}

/// Sorted listing of everything under `targets`, minus paths matching `excludes`.
///
/// The sort runs in the C locale so the output is in byte order.
pub fn list(targets: &[String], excludes: &[String]) -> Result<String, CommandError> {
    if targets.is_empty() {
        return Err(CommandError::NoTargets);
    }
    let mut parts = vec!["find".to_string()];
    for target in targets {
        parts.push(quote(target)?);
    }
    for exclude in excludes {
        parts.push("-not -path".to_string());
        parts.push(quote(exclude)?);
    }
    parts.push("| LC_ALL=C sort".to_string());
    Ok(parts.join(" "))
}

pub fn exists(path: &str) -> Result<String, CommandError> {
    Ok(format!("test -e {}", quote(path)?))
}

pub fn stat(path: &str) -> Result<String, CommandError> {
    Ok(format!("stat -c {} {}", quote(STAT_FORMAT)?, quote(path)?))
}

pub fn md5sum(path: &str) -> Result<String, CommandError> {
    Ok(format!("md5sum {}", quote(path)?))
}

/// Dumps small text files verbatim and hashes everything else.
pub fn fingerprint(path: &str) -> Result<String, CommandError> {
    let path = quote(path)?;
    Ok(format!(
        "if file -b {path} | grep text > /dev/null 2>&1 && \
         [ \"$(wc -c {path} | awk '{{print $1}}')\" -lt {INLINE_CONTENT_LIMIT} ]; \
         then cat {path}; else md5sum {path}; fi"
    ))
}

/// Wraps `command` as `sudo -S -p '' sh -c "<command>"`.
///
/// The prompt is blanked because the pty merges it into stdout. Characters that
/// are special inside double quotes are backslash escaped, so the inner shell
/// receives `command` verbatim.
pub fn elevate(command: &str) -> String {
    let mut escaped = String::with_capacity(command.len() + 8);
    for c in command.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("sudo -S -p '' sh -c \"{}\"", escaped)
}
