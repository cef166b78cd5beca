//! Per-stage timing of example processing.
//!
//! A [StageTimer] measures the stages of one example and forwards each
//! duration to the events sink. With the `profiling` feature it also logs
//! them on [report](StageTimer::report). Logged stages can be limited with
//! the comma separated `IDS_PROFILING_STAGES` environment variable.

use crate::{common::*, events::DatasetEventsSink};

#[cfg(feature = "profiling")]
lazy_static! {
    static ref PROFILING_CONFIG: ProfilingConfig = {
        match envy::prefixed("IDS_").from_env() {
            Ok(config) => config,
            Err(err) => {
                warn!(
                    "failed to load profiling environment variables, fallback to default values: {:?}",
                    err
                );
                Default::default()
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilingConfig {
    /// Stage names to log. All stages are logged if unset.
    pub profiling_stages: Option<HashSet<String>>,
}

impl ProfilingConfig {
    pub fn logs(&self, stage: ProcessingStage) -> bool {
        self.profiling_stages
            .as_ref()
            .map(|stages| stages.contains(stage.as_ref()))
            .unwrap_or(true)
    }
}

/// A stage of processing one example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ProcessingStage {
    Decompress,
    Transform,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct StageTimer<'a> {
    thread_id: usize,
    instant: Instant,
    elapsed: Vec<(ProcessingStage, Duration)>,
    #[derivative(Debug = "ignore")]
    events_sink: Option<&'a dyn DatasetEventsSink>,
}

impl<'a> StageTimer<'a> {
    pub fn new(thread_id: usize, events_sink: Option<&'a dyn DatasetEventsSink>) -> Self {
        Self {
            thread_id,
            instant: Instant::now(),
            elapsed: vec![],
            events_sink,
        }
    }

    /// Ends `stage` and starts timing the next one.
    pub fn finish_stage(&mut self, stage: ProcessingStage) {
        let elapsed = self.instant.elapsed();
        self.instant = Instant::now();

        if let Some(sink) = self.events_sink {
            sink.image_processing_stage(self.thread_id, stage, elapsed);
        }
        self.elapsed.push((stage, elapsed));
    }

    pub fn elapsed(&self) -> &[(ProcessingStage, Duration)] {
        &self.elapsed
    }

    pub fn report(&self) {
        #[cfg(feature = "profiling")]
        {
            let stages: Vec<_> = self
                .elapsed
                .iter()
                .filter(|(stage, _)| PROFILING_CONFIG.logs(*stage))
                .collect();

            if !stages.is_empty() {
                info!("example timing on processing thread {}", self.thread_id);
                stages.into_iter().for_each(|(stage, elapsed)| {
                    info!("- {}\t{:?}", stage.as_ref(), elapsed);
                });
            }
        }
    }
}
