//! Full-rebuild threshold decision.

use reindex_types::IndexingSettings;

/// What a run should do with its merged records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Apply the merged records as an incremental update
    Incremental,
    /// Discard the records and rebuild the whole index
    FullRebuild {
        /// Announce the rebuild to the other index nodes
        broadcast: bool,
    },
}

/// Compares merged change counts against the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPolicy {
    pub enabled: bool,
    pub ceiling: usize,
    pub broadcast: bool,
}

impl ThresholdPolicy {
    pub fn from_settings(settings: &IndexingSettings) -> Self {
        Self {
            enabled: settings.check_for_threshold,
            ceiling: settings.full_rebuild_item_count_threshold,
            broadcast: settings.raise_remote_events,
        }
    }

    pub fn decide(&self, merged_count: usize) -> Decision {
        if self.enabled && merged_count > self.ceiling {
            Decision::FullRebuild {
                broadcast: self.broadcast,
            }
        } else {
            Decision::Incremental
        }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::from_settings(&IndexingSettings::default())
    }
}
