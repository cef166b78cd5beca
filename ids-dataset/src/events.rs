//! Notifications emitted by the loading pipeline.

use crate::{common::*, profiling::ProcessingStage};
use std::sync::atomic::{AtomicU64, AtomicUsize};

/// Receives progress events from the disk and image processing workers.
///
/// Every method has an empty default body, so implementors only override
/// what they observe.
pub trait DatasetEventsSink
where
    Self: Send + Sync,
{
    fn data_read_threads_count(&self, _count: usize) {}

    fn data_read_start(&self, _thread_id: usize) {}

    fn data_read_end(&self, _thread_id: usize, _bytes_read: usize) {}

    fn image_processing_threads_count(&self, _count: usize) {}

    fn image_processing_start(&self, _thread_id: usize) {}

    /// Called after each finished stage of an example.
    fn image_processing_stage(&self, _thread_id: usize, _stage: ProcessingStage, _elapsed: Duration) {}

    /// Called before [image_processing_end](DatasetEventsSink::image_processing_end)
    /// when the example failed.
    fn image_processing_error(&self, _thread_id: usize) {}

    /// Pairs every `image_processing_start`, failed examples included.
    fn image_processing_end(&self, _thread_id: usize) {}
}

/// Counts bytes read and examples processed.
#[derive(Debug, Default)]
pub struct LoadStatistics {
    bytes_read: AtomicUsize,
    chunks_read: AtomicUsize,
    examples_started: AtomicUsize,
    examples_processed: AtomicUsize,
    examples_failed: AtomicUsize,
    image_processing_threads: AtomicUsize,
    decompress: StageStatistics,
    transform: StageStatistics,
}

#[derive(Debug, Default)]
struct StageStatistics {
    count: AtomicUsize,
    nanos: AtomicU64,
}

impl LoadStatistics {
    pub fn bytes_read(&self) -> usize {
        self.bytes_read.load(atomic::Ordering::Relaxed)
    }

    pub fn chunks_read(&self) -> usize {
        self.chunks_read.load(atomic::Ordering::Relaxed)
    }

    pub fn examples_started(&self) -> usize {
        self.examples_started.load(atomic::Ordering::Relaxed)
    }

    /// Examples that finished processing, failed ones included.
    pub fn examples_processed(&self) -> usize {
        self.examples_processed.load(atomic::Ordering::Relaxed)
    }

    pub fn examples_failed(&self) -> usize {
        self.examples_failed.load(atomic::Ordering::Relaxed)
    }

    pub fn image_processing_threads(&self) -> usize {
        self.image_processing_threads
            .load(atomic::Ordering::Relaxed)
    }

    /// Number of examples that finished `stage`.
    pub fn stage_count(&self, stage: ProcessingStage) -> usize {
        self.stage(stage).count.load(atomic::Ordering::Relaxed)
    }

    /// Total time spent in `stage` over all threads.
    pub fn stage_time(&self, stage: ProcessingStage) -> Duration {
        Duration::from_nanos(self.stage(stage).nanos.load(atomic::Ordering::Relaxed))
    }

    fn stage(&self, stage: ProcessingStage) -> &StageStatistics {
        match stage {
            ProcessingStage::Decompress => &self.decompress,
            ProcessingStage::Transform => &self.transform,
        }
    }
}

impl DatasetEventsSink for LoadStatistics {
    fn data_read_end(&self, _thread_id: usize, bytes_read: usize) {
        self.bytes_read
            .fetch_add(bytes_read, atomic::Ordering::Relaxed);
        self.chunks_read.fetch_add(1, atomic::Ordering::Relaxed);
    }

    fn image_processing_threads_count(&self, count: usize) {
        self.image_processing_threads
            .store(count, atomic::Ordering::Relaxed);
    }

    fn image_processing_start(&self, _thread_id: usize) {
        self.examples_started
            .fetch_add(1, atomic::Ordering::Relaxed);
    }

    fn image_processing_stage(&self, _thread_id: usize, stage: ProcessingStage, elapsed: Duration) {
        let stage = self.stage(stage);
        stage.count.fetch_add(1, atomic::Ordering::Relaxed);
        stage
            .nanos
            .fetch_add(elapsed.as_nanos() as u64, atomic::Ordering::Relaxed);
    }

    fn image_processing_error(&self, _thread_id: usize) {
        self.examples_failed
            .fetch_add(1, atomic::Ordering::Relaxed);
    }

    fn image_processing_end(&self, _thread_id: usize) {
        self.examples_processed
            .fetch_add(1, atomic::Ordering::Relaxed);
    }
}
