// SPDX-License-Identifier: GPL-3.0-only

//! Snapshot naming
//!
//! All snapshots of a subvolume are named `<subvolume>-Snapshot-<YYYY-MM-DD>`.
//! The date suffix sorts lexicographically in chronological order, which the
//! locator relies on.

use chrono::NaiveDate;

/// The name part shared by all snapshot subvolumes
pub const SNAPSHOT_NAME_MIDDLE: &str = "-Snapshot-";

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_LEN: usize = 10;

/// Name pattern of all snapshots of one subvolume
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotPattern {
    subvolume: String,
}

impl SnapshotPattern {
    pub fn new(subvolume: impl Into<String>) -> Self {
        Self {
            subvolume: subvolume.into(),
        }
    }

    pub fn subvolume(&self) -> &str {
        &self.subvolume
    }

    /// `<subvolume>-Snapshot-`, the part every snapshot name starts with
    pub fn prefix(&self) -> String {
        format!("{}{}", self.subvolume, SNAPSHOT_NAME_MIDDLE)
    }

    /// Snapshot name for the given date
    pub fn name_for(&self, date: NaiveDate) -> String {
        format!("{}{}", self.prefix(), date.format(DATE_FORMAT))
    }

    /// Whether `name` belongs to this subvolume's history
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix())
    }
}

/// Parse the trailing `YYYY-MM-DD` of a snapshot name
pub fn parse_snapshot_date(name: &str) -> Option<NaiveDate> {
    if name.len() < DATE_LEN || !name.is_char_boundary(name.len() - DATE_LEN) {
        return None;
    }
    NaiveDate::parse_from_str(&name[name.len() - DATE_LEN..], DATE_FORMAT).ok()
}
