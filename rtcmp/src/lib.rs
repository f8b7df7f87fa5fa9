//! `rtcmp` compares the file trees of two SSH hosts.
//!
//! Nothing is installed remotely: each host is listed with `find | sort`, the two
//! listings are merge-joined locally, and paths present on both sides are
//! compared by their `stat` output and a content fingerprint.

pub mod cmp;

pub use cmp::{CompareSettings, ComparisonOutcome, ModifiedReason, compare};
