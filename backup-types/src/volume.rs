// SPDX-License-Identifier: GPL-3.0-only

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Role of a configured volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeRole {
    Source,
    Destination,
    /// Missing or any other value in the configuration file; rejected by validation
    #[default]
    #[serde(other)]
    Unknown,
}

/// Number of snapshots to keep per retention bucket
///
/// `day`: the latest n snapshots. `month`: the latest snapshot of each of the
/// last n months (30 days). `year`: the latest snapshot of each of the last n
/// years (365 days).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub day: u32,
    pub month: u32,
    pub year: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            day: 7,
            month: 6,
            year: 5,
        }
    }
}

impl RetentionPolicy {
    pub fn new(day: u32, month: u32, year: u32) -> Self {
        Self { day, month, year }
    }

    /// Upper bound of snapshots surviving a thinning pass (plus the protected baseline)
    pub fn capacity(&self) -> usize {
        (self.day + self.month + self.year) as usize
    }
}

/// The `keep` item as written in the configuration
///
/// Counts stay unchecked until [`crate::Registry::check_item`] validates the
/// entry; a missing count is reported there instead of failing the load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepCounts {
    #[serde(default)]
    pub day: Option<i64>,
    #[serde(default)]
    pub month: Option<i64>,
    #[serde(default)]
    pub year: Option<i64>,
}

impl KeepCounts {
    /// The policy of validated counts; anything unusable falls back to the default
    pub fn policy(&self) -> RetentionPolicy {
        let fallback = RetentionPolicy::default();
        let count = |value: Option<i64>, default: u32| {
            value
                .and_then(|value| u32::try_from(value).ok())
                .unwrap_or(default)
        };
        RetentionPolicy::new(
            count(self.day, fallback.day),
            count(self.month, fallback.month),
            count(self.year, fallback.year),
        )
    }
}

impl From<RetentionPolicy> for KeepCounts {
    fn from(policy: RetentionPolicy) -> Self {
        Self {
            day: Some(policy.day.into()),
            month: Some(policy.month.into()),
            year: Some(policy.year.into()),
        }
    }
}

/// `null` reads as an empty string, which validation rejects
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of the `backup` section of the configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Key of the entry in the registry; filled in by [`crate::Registry::new`]
    #[serde(skip)]
    pub name: String,

    /// Subvolume name without the `-Snapshot-YYYY-MM-DD` suffix.
    /// On non-BTRFS volumes a top level directory is used like a subvolume.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub subvolume: String,

    /// Filesystem UUID used to mount the volume
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uuid: String,

    #[serde(rename = "type", default)]
    pub role: VolumeRole,

    /// Date of the last snapshot stored on this volume
    #[serde(rename = "last-snapshot", default)]
    pub last_snapshot: Option<NaiveDate>,

    /// Retention policy, only used on BTRFS volumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<KeepCounts>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl VolumeConfig {
    pub fn is_source(&self) -> bool {
        self.role == VolumeRole::Source
    }

    pub fn is_destination(&self) -> bool {
        self.role == VolumeRole::Destination
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.keep.map(|keep| keep.policy()).unwrap_or_default()
    }
}
