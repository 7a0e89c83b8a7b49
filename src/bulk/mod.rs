//! Bulk scan orchestration.
//!
//! Runs the single-image pipeline over a file list with a bounded worker
//! pool. The run can be paused, resumed and stopped from outside through a
//! [`BulkHandle`]; failed files are retried per policy and every file that
//! enters processing produces exactly one result record.

pub mod events;
pub mod retry;

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{BulkSettings, ErrorHandling};
use crate::pipeline::{ProcessingQueueItem, ResultRecord, ScanPipeline, ScanStage};

pub use events::{BulkSnapshot, ScanEvent};
pub use retry::RetryPolicy;

const PAUSE_POLL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct BulkState {
    queue: VecDeque<PathBuf>,
    active: HashSet<Uuid>,
    processed_filenames: HashSet<String>,
    processed_count: usize,
    matched_count: usize,
    failed_count: usize,
    is_processing: bool,
    is_paused: bool,
    is_stopped: bool,
    started: Instant,
    events: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl BulkState {
    fn idle() -> Self {
        Self {
            queue: VecDeque::new(),
            active: HashSet::new(),
            processed_filenames: HashSet::new(),
            processed_count: 0,
            matched_count: 0,
            failed_count: 0,
            is_processing: false,
            is_paused: false,
            is_stopped: false,
            started: Instant::now(),
            events: None,
        }
    }

    fn snapshot(&self) -> BulkSnapshot {
        BulkSnapshot {
            is_processing: self.is_processing,
            is_paused: self.is_paused,
            is_stopped: self.is_stopped,
            processed_count: self.processed_count,
            matched_count: self.matched_count,
            failed_count: self.failed_count,
            pending_count: self.queue.len(),
            active_count: self.active.len(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(ref sender) = self.events {
            let _ = sender.send(event);
        }
    }
}

/// External control over a running bulk scan.
#[derive(Clone)]
pub struct BulkHandle {
    state: Arc<Mutex<BulkState>>,
}

impl BulkHandle {
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if state.is_processing && !state.is_paused {
            state.is_paused = true;
            state.emit(ScanEvent::Paused);
            info!("bulk run paused");
        }
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        if state.is_paused {
            state.is_paused = false;
            state.emit(ScanEvent::Resumed);
            info!("bulk run resumed");
        }
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        if state.is_processing && !state.is_stopped {
            state.is_stopped = true;
            state.is_paused = false;
            info!("bulk run stopping");
        }
    }

    pub fn snapshot(&self) -> BulkSnapshot {
        self.state.lock().snapshot()
    }
}

/// Runs the pipeline over many files with bounded concurrency.
pub struct BulkOrchestrator {
    pipeline: Arc<ScanPipeline>,
    settings: BulkSettings,
    state: Arc<Mutex<BulkState>>,
}

impl BulkOrchestrator {
    pub fn new(pipeline: Arc<ScanPipeline>, settings: BulkSettings) -> Self {
        Self {
            pipeline,
            settings,
            state: Arc::new(Mutex::new(BulkState::idle())),
        }
    }

    pub fn handle(&self) -> BulkHandle {
        BulkHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Process `files`, emitting progress on `events`. Returns one record per
    /// file that entered processing, in completion order.
    pub async fn run(
        &self,
        files: Vec<PathBuf>,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Vec<ResultRecord> {
        let queue = self.build_queue(files, &events);
        let total = queue.len();
        let workers = self.settings.effective_concurrency().min(total.max(1));

        {
            let mut state = self.state.lock();
            *state = BulkState::idle();
            state.queue = queue;
            state.is_processing = true;
            state.events = Some(events.clone());
        }

        let _ = events.send(ScanEvent::Started {
            total,
            max_concurrent: workers,
        });
        info!(total, workers, "bulk run started");

        let results = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let policy = RetryPolicy::from_auto_retry(self.settings.auto_retry);
        let error_handling = self.settings.error_handling;

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(tokio::spawn(worker_loop(
                Arc::clone(&self.pipeline),
                Arc::clone(&self.state),
                Arc::clone(&results),
                events.clone(),
                policy,
                error_handling,
            )));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("bulk worker panicked: {e}");
            }
        }

        let (snapshot, stopped) = {
            let mut state = self.state.lock();
            state.is_processing = false;
            state.events = None;
            (state.snapshot(), state.is_stopped)
        };
        if stopped {
            let _ = events.send(ScanEvent::Stopped);
        }
        let _ = events.send(ScanEvent::Finished { snapshot });
        info!(
            processed = snapshot.processed_count,
            matched = snapshot.matched_count,
            failed = snapshot.failed_count,
            elapsed_ms = snapshot.elapsed_ms,
            "bulk run finished"
        );

        let mut results = results.lock();
        std::mem::take(&mut *results)
    }

    /// Drop within-run duplicate basenames, then cap to the batch size.
    fn build_queue(
        &self,
        files: Vec<PathBuf>,
        events: &mpsc::UnboundedSender<ScanEvent>,
    ) -> VecDeque<PathBuf> {
        let mut queue = VecDeque::with_capacity(files.len());
        let mut seen = HashSet::new();
        for file in files {
            let basename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            if self.settings.skip_duplicates && !seen.insert(basename.clone()) {
                let _ = events.send(ScanEvent::DuplicateSkipped { filename: basename });
                continue;
            }
            queue.push_back(file);
        }
        if self.settings.batch_size > 0 {
            queue.truncate(self.settings.batch_size);
        }
        queue
    }
}

async fn worker_loop(
    pipeline: Arc<ScanPipeline>,
    state: Arc<Mutex<BulkState>>,
    results: Arc<Mutex<Vec<ResultRecord>>>,
    events: mpsc::UnboundedSender<ScanEvent>,
    policy: RetryPolicy,
    error_handling: ErrorHandling,
) {
    loop {
        // Hold here while paused; leave when stopped.
        loop {
            let (paused, stopped) = {
                let s = state.lock();
                (s.is_paused, s.is_stopped)
            };
            if stopped {
                return;
            }
            if !paused {
                break;
            }
            tokio::time::sleep(PAUSE_POLL).await;
        }

        let path = {
            let mut s = state.lock();
            s.queue.pop_front()
        };
        let Some(path) = path else {
            return;
        };

        let item = ProcessingQueueItem::new(&path);
        let filename = item
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.file.display().to_string());
        {
            state.lock().active.insert(item.id);
        }

        let stage_events = events.clone();
        let stage_item = item.clone();
        let on_stage = move |stage: ScanStage| {
            let _ = stage_events.send(ScanEvent::Stage {
                item: stage_item.at_stage(stage),
            });
        };

        let started = Instant::now();
        let attempt = retry::retry_with_policy(
            &policy,
            |retry_no, max_retries| {
                let _ = events.send(ScanEvent::Retrying {
                    filename: filename.clone(),
                    attempt: retry_no,
                    max_retries,
                });
            },
            || pipeline.try_process(&path, &on_stage),
        )
        .await;

        match attempt {
            Ok(record) => {
                let snapshot = {
                    let mut s = state.lock();
                    s.active.remove(&item.id);
                    s.processed_count += 1;
                    s.processed_filenames.insert(record.filename.clone());
                    if record.matched {
                        s.matched_count += 1;
                    } else {
                        s.failed_count += 1;
                    }
                    s.snapshot()
                };
                let _ = events.send(ScanEvent::Completed {
                    filename: record.filename.clone(),
                    card_name: record.matched_name.clone(),
                    snapshot,
                });
                results.lock().push(record);
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let record = ResultRecord::degraded(filename.clone(), &e, elapsed);
                let snapshot = {
                    let mut s = state.lock();
                    s.active.remove(&item.id);
                    s.processed_count += 1;
                    s.failed_count += 1;
                    s.processed_filenames.insert(filename.clone());
                    match error_handling {
                        ErrorHandling::Continue => {}
                        ErrorHandling::Pause => {
                            if !s.is_paused {
                                s.is_paused = true;
                                s.emit(ScanEvent::Paused);
                            }
                        }
                        ErrorHandling::Stop => s.is_stopped = true,
                    }
                    s.snapshot()
                };
                warn!(%filename, "file failed after retries: {e}");
                let _ = events.send(ScanEvent::Failed {
                    filename,
                    error: e.to_string(),
                    snapshot,
                });
                results.lock().push(record);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CardCatalog, CardRecord};
    use crate::vision::ocr::tests::{outcome, ScriptedRecognizer};
    use crate::vision::{OcrAdapter, OcrConfig};
    use std::path::Path;

    fn catalog() -> Arc<CardCatalog> {
        Arc::new(CardCatalog::new(vec![CardRecord {
            name: "Blue-Eyes White Dragon".to_string(),
            description: "This legendary dragon is a powerful engine of destruction."
                .to_string(),
            card_type: "Monster".to_string(),
            race: "Dragon".to_string(),
            archetype: None,
            attack: Some(3000),
            defense: Some(2500),
            level: Some(8),
            set_codes: vec!["LOB-001".to_string()],
        }]))
    }

    // JPEG has no alpha channel, so save from RGB.
    fn write_card_jpg(dir: &Path, name: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let img = image::RgbImage::from_pixel(800, 1165, image::Rgb([200, 200, 200]));
        img.save(&path).unwrap();
        path
    }

    /// Adapter with one variant per region: two recognize calls per file.
    fn scripted_pipeline(
        script: Vec<Result<crate::vision::OcrOutcome, crate::error::ScanError>>,
    ) -> Arc<ScanPipeline> {
        let adapter = OcrAdapter::with_variants(
            Arc::new(ScriptedRecognizer::new(script)),
            vec![OcrConfig::new(7, None)],
            vec![OcrConfig::new(6, None)],
        );
        Arc::new(ScanPipeline::new(adapter, catalog()))
    }

    fn settings(max_concurrent: usize) -> BulkSettings {
        BulkSettings {
            max_concurrent,
            batch_size: 0,
            skip_duplicates: true,
            auto_retry: false,
            error_handling: ErrorHandling::Continue,
        }
    }

    #[tokio::test]
    async fn test_bulk_run_with_duplicate_skip_and_accounting() {
        let dir = tempfile::tempdir().unwrap();
        let a1 = write_card_jpg(&dir.path().join("dir_a"), "A.jpg");
        let b = write_card_jpg(dir.path(), "B.jpg");
        let a2 = write_card_jpg(&dir.path().join("dir_b"), "A.jpg");

        // Sequential worker, so the script runs in queue order:
        // A.jpg name+effect, then B.jpg name+effect.
        let pipeline = scripted_pipeline(vec![
            outcome("Blue-Eyes White Dragon", 0.9),
            outcome("This legendary dragon", 0.8),
            outcome("Unreadable", 0.4),
            outcome("zzz yyy xxx", 0.3),
        ]);
        let orchestrator = BulkOrchestrator::new(pipeline, settings(1));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let records = orchestrator.run(vec![a1, b, a2], tx).await;
        assert_eq!(records.len(), 2);

        let mut skipped = Vec::new();
        let mut finished = None;
        let mut started = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::DuplicateSkipped { filename } => skipped.push(filename),
                ScanEvent::Finished { snapshot } => finished = Some(snapshot),
                ScanEvent::Started { total, .. } => started = Some(total),
                _ => {}
            }
        }
        assert_eq!(skipped, vec!["A.jpg"]);
        assert_eq!(started, Some(2));

        let snapshot = finished.unwrap();
        assert_eq!(snapshot.processed_count, 2);
        assert_eq!(snapshot.matched_count, 1);
        assert_eq!(snapshot.failed_count, 1);
        assert_eq!(snapshot.pending_count, 0);
        assert_eq!(snapshot.active_count, 0);
        assert!(!snapshot.is_processing);

        // Matched and unmatched files both produced a record.
        let matched: Vec<_> = records.iter().filter(|r| r.matched).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].filename, "A.jpg");
    }

    #[tokio::test]
    async fn test_bulk_stop_on_error_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_card_jpg(dir.path(), "good.jpg");
        let never_reached = write_card_jpg(dir.path(), "later.jpg");

        let pipeline = scripted_pipeline(vec![]);
        let mut cfg = settings(1);
        cfg.error_handling = ErrorHandling::Stop;
        let orchestrator = BulkOrchestrator::new(pipeline, cfg);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let records = orchestrator
            .run(
                vec![PathBuf::from("/nonexistent/broken.jpg"), good, never_reached],
                tx,
            )
            .await;

        // Only the failing file was processed; the rest drained.
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "broken.jpg");
        assert!(!records[0].matched);
        assert!(records[0].error.is_some());

        let mut saw_stopped = false;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::Stopped => saw_stopped = true,
                ScanEvent::Finished { snapshot } => finished = Some(snapshot),
                _ => {}
            }
        }
        assert!(saw_stopped);
        let snapshot = finished.unwrap();
        assert_eq!(snapshot.processed_count, 1);
        assert_eq!(snapshot.failed_count, 1);
        assert_eq!(snapshot.pending_count, 2);
        assert!(snapshot.is_stopped);
    }

    #[tokio::test]
    async fn test_bulk_retry_then_failure_keeps_one_record() {
        let pipeline = scripted_pipeline(vec![]);
        let mut cfg = settings(1);
        cfg.auto_retry = true;
        let orchestrator = BulkOrchestrator::new(pipeline, cfg);
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Missing file fails every attempt. Retries are real sleeps, so this
        // test pays two 1s backoffs.
        let records = orchestrator
            .run(vec![PathBuf::from("/nonexistent/gone.jpg")], tx)
            .await;
        assert_eq!(records.len(), 1);
        assert!(records[0].error.is_some());

        let mut retries = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ScanEvent::Retrying {
                attempt,
                max_retries,
                ..
            } = event
            {
                retries.push((attempt, max_retries));
            }
        }
        assert_eq!(retries, vec![(1, 2), (2, 2)]);
    }

    #[tokio::test]
    async fn test_two_workers_respect_concurrency_bound() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..5)
            .map(|i| write_card_jpg(dir.path(), &format!("card{i}.jpg")))
            .collect();

        // Identical outcomes for every call, so worker interleaving cannot
        // change what a file resolves to. 5 files, 2 regions each.
        let pipeline = scripted_pipeline((0..10).map(|_| outcome("", 0.0)).collect());
        let orchestrator = BulkOrchestrator::new(pipeline, settings(2));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let records = orchestrator.run(files, tx).await;
        assert_eq!(records.len(), 5);

        let mut completed = 0;
        let mut finished = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::Started { max_concurrent, .. } => {
                    assert_eq!(max_concurrent, 2);
                }
                ScanEvent::Completed { snapshot, .. } | ScanEvent::Failed { snapshot, .. } => {
                    assert!(snapshot.active_count <= 2);
                    completed += 1;
                }
                ScanEvent::Finished { snapshot } => finished = Some(snapshot),
                _ => {}
            }
        }
        assert_eq!(completed, 5);

        let snapshot = finished.unwrap();
        assert_eq!(snapshot.processed_count, 5);
        assert_eq!(snapshot.failed_count, 5);
        assert_eq!(snapshot.pending_count, 0);
        assert_eq!(snapshot.active_count, 0);
    }

    #[tokio::test]
    async fn test_pause_on_error_holds_until_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_card_jpg(dir.path(), "good.jpg");

        // First file fails and pauses the run; the second waits at the gate.
        let pipeline = scripted_pipeline(vec![outcome("", 0.0), outcome("", 0.0)]);
        let mut cfg = settings(1);
        cfg.error_handling = ErrorHandling::Pause;
        let orchestrator = BulkOrchestrator::new(pipeline, cfg);
        let handle = orchestrator.handle();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let files = vec![PathBuf::from("/nonexistent/broken.jpg"), good];
        let run = orchestrator.run(files, tx);
        tokio::pin!(run);

        // Drive the run until it pauses.
        let paused = async {
            loop {
                let snapshot = handle.snapshot();
                if snapshot.is_paused {
                    break snapshot;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        let snapshot = tokio::select! {
            records = &mut run => panic!("run finished while paused: {records:?}"),
            snapshot = paused => snapshot,
        };
        assert_eq!(snapshot.processed_count, 1);
        assert_eq!(snapshot.pending_count, 1);

        handle.resume();
        let records = run.await;
        assert_eq!(records.len(), 2);
        assert_eq!(handle.snapshot().processed_count, 2);

        let mut saw_paused = false;
        let mut saw_resumed = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                ScanEvent::Paused => saw_paused = true,
                ScanEvent::Resumed => saw_resumed = true,
                _ => {}
            }
        }
        assert!(saw_paused);
        assert!(saw_resumed);
    }

    #[tokio::test]
    async fn test_bulk_batch_size_caps_queue() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<PathBuf> = (0..4)
            .map(|i| write_card_jpg(dir.path(), &format!("card{i}.jpg")))
            .collect();

        // 2 files, 2 regions each, nothing recognized.
        let pipeline = scripted_pipeline(vec![
            outcome("", 0.0),
            outcome("", 0.0),
            outcome("", 0.0),
            outcome("", 0.0),
        ]);
        let mut cfg = settings(1);
        cfg.batch_size = 2;
        let orchestrator = BulkOrchestrator::new(pipeline, cfg);
        let (tx, _rx) = mpsc::unbounded_channel();

        let records = orchestrator.run(files, tx).await;
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_handle_snapshot_idle_and_after_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_card_jpg(dir.path(), "card.jpg");

        let pipeline = scripted_pipeline(vec![outcome("", 0.0), outcome("", 0.0)]);
        let orchestrator = BulkOrchestrator::new(pipeline, settings(1));
        let handle = orchestrator.handle();
        let (tx, _rx) = mpsc::unbounded_channel();

        // Snapshot from an idle orchestrator is all zeroes.
        let idle = handle.snapshot();
        assert_eq!(idle.processed_count, 0);
        assert!(!idle.is_processing);

        let records = orchestrator.run(vec![file], tx).await;
        assert_eq!(records.len(), 1);
        assert!(!handle.snapshot().is_processing);
    }
}
