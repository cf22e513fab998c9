// SPDX-License-Identifier: GPL-3.0-only

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Modification time tolerance on FAT volumes: one hour for daylight saving
/// shifts of the local wall-clock time FAT stores, plus 100 seconds.
pub const FAT_MODIFY_WINDOW_SECS: u64 = 3700;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataPreservation {
    /// Ownership, permissions, timestamps, links and devices
    Archive,
    /// Modification times only
    TimesOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkHandling {
    /// Copy symbolic links as links
    Preserve,
    /// Copy only links that stay inside the tree, drop the others
    SafeOnly,
}

/// Options of a one-filesystem mirror from a source tree into a destination tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorOptions {
    /// Remove stale destination entries before copying
    pub delete_before: bool,
    pub preserve: MetadataPreservation,
    pub links: LinkHandling,
    /// Timestamps differing by at most this many seconds count as equal
    pub modify_window_secs: u64,
}

impl MirrorOptions {
    /// Exact copy for filesystems able to store ownership and permissions
    pub fn archive() -> Self {
        Self {
            delete_before: true,
            preserve: MetadataPreservation::Archive,
            links: LinkHandling::Preserve,
            modify_window_secs: 0,
        }
    }

    /// Copy for FAT volumes: no ownership, only safe links, widened time window
    pub fn fat_tolerant() -> Self {
        Self {
            delete_before: true,
            preserve: MetadataPreservation::TimesOnly,
            links: LinkHandling::SafeOnly,
            modify_window_secs: FAT_MODIFY_WINDOW_SECS,
        }
    }

    pub fn for_fat(fat: bool) -> Self {
        if fat { Self::fat_tolerant() } else { Self::archive() }
    }

    /// Whether two modification times are equal under this mirror's window
    pub fn times_match(&self, left: SystemTime, right: SystemTime) -> bool {
        let difference = left
            .duration_since(right)
            .or_else(|_| right.duration_since(left))
            .unwrap_or(Duration::ZERO);
        difference <= Duration::from_secs(self.modify_window_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u64, minute: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + hour * 3600 + minute * 60)
    }

    #[test]
    fn fat_window_absorbs_dst_shift() {
        let options = MirrorOptions::fat_tolerant();
        // 3120 seconds apart
        assert!(options.times_match(at(9, 0), at(8, 8)));
        assert!(options.times_match(at(8, 8), at(9, 0)));
        // 3720 seconds apart
        assert!(!options.times_match(at(9, 0), at(7, 58)));
    }

    #[test]
    fn archive_mode_requires_exact_times() {
        let options = MirrorOptions::archive();
        assert!(options.times_match(at(9, 0), at(9, 0)));
        assert!(!options.times_match(at(9, 0), at(9, 1)));
        assert_eq!(options.preserve, MetadataPreservation::Archive);
    }
}
