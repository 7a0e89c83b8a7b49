//! Progress events and counters emitted during a bulk run.

use crate::pipeline::ProcessingQueueItem;

/// Point-in-time view of a bulk run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkSnapshot {
    pub is_processing: bool,
    pub is_paused: bool,
    pub is_stopped: bool,
    pub processed_count: usize,
    pub matched_count: usize,
    pub failed_count: usize,
    pub pending_count: usize,
    pub active_count: usize,
    pub elapsed_ms: u64,
}

/// Everything observable about a bulk run, in emission order.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started {
        total: usize,
        max_concurrent: usize,
    },
    DuplicateSkipped {
        filename: String,
    },
    Stage {
        item: ProcessingQueueItem,
    },
    Retrying {
        filename: String,
        attempt: u32,
        max_retries: u32,
    },
    Completed {
        filename: String,
        card_name: Option<String>,
        snapshot: BulkSnapshot,
    },
    Failed {
        filename: String,
        error: String,
        snapshot: BulkSnapshot,
    },
    Paused,
    Resumed,
    Stopped,
    Finished {
        snapshot: BulkSnapshot,
    },
}

impl ScanEvent {
    /// Human-readable one-liner for logs and progress displays.
    pub fn message(&self) -> String {
        match self {
            ScanEvent::Started {
                total,
                max_concurrent,
            } => format!("processing {total} files with {max_concurrent} workers"),
            ScanEvent::DuplicateSkipped { filename } => {
                format!("skipped duplicate {filename}")
            }
            ScanEvent::Stage { item } => format!(
                "{}: {} ({}%)",
                item.file.display(),
                item.stage.label(),
                item.progress
            ),
            ScanEvent::Retrying {
                filename,
                attempt,
                max_retries,
            } => format!("retrying {filename} ({attempt}/{max_retries})"),
            ScanEvent::Completed {
                filename,
                card_name,
                snapshot,
            } => match card_name {
                Some(name) => format!(
                    "{filename}: {name} ({} done)",
                    snapshot.processed_count
                ),
                None => format!(
                    "{filename}: no match ({} done)",
                    snapshot.processed_count
                ),
            },
            ScanEvent::Failed {
                filename,
                error,
                snapshot,
            } => format!(
                "{filename} failed: {error} ({} done)",
                snapshot.processed_count
            ),
            ScanEvent::Paused => "paused".to_string(),
            ScanEvent::Resumed => "resumed".to_string(),
            ScanEvent::Stopped => "stopped".to_string(),
            ScanEvent::Finished { snapshot } => format!(
                "finished: {} processed, {} matched, {} failed in {}ms",
                snapshot.processed_count,
                snapshot.matched_count,
                snapshot.failed_count,
                snapshot.elapsed_ms
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_messages() {
        let started = ScanEvent::Started {
            total: 10,
            max_concurrent: 2,
        };
        assert_eq!(started.message(), "processing 10 files with 2 workers");

        let retrying = ScanEvent::Retrying {
            filename: "card.jpg".to_string(),
            attempt: 1,
            max_retries: 2,
        };
        assert_eq!(retrying.message(), "retrying card.jpg (1/2)");

        let snapshot = BulkSnapshot {
            processed_count: 3,
            matched_count: 2,
            failed_count: 1,
            elapsed_ms: 1500,
            ..BulkSnapshot::default()
        };
        let finished = ScanEvent::Finished { snapshot };
        assert_eq!(
            finished.message(),
            "finished: 3 processed, 2 matched, 1 failed in 1500ms"
        );
    }
}
