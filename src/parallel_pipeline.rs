// THEORY:
// Tracking is inherently sequential, but extracting blobs from one frame delta
// is a pure function of two frames. The survey exploits that: a pool of workers
// labels every consecutive frame pair concurrently, and the reports are put
// back into frame order before they are returned.
//
// A single dispatcher hands tasks round-robin to per-worker channels. Each
// worker runs the decode/diff/label work on the blocking thread pool and
// answers over the task's oneshot channel.

use crate::core_modules::blob::Blob;
use crate::error::{Result, VisionError};
use crate::pipeline::{FrameDeltas, PipelineConfig};
use futures::future::join_all;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Blobs found in the delta between frames `index - 1` and `index`.
#[derive(Debug, Clone)]
pub struct DeltaReport {
    pub index: usize,
    pub previous: PathBuf,
    pub current: PathBuf,
    pub blobs: Vec<Blob>,
}

pub struct SurveyTask {
    pub index: usize,
    pub result_sender: oneshot::Sender<Result<DeltaReport>>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<SurveyTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers on the current runtime.
    pub fn new(deltas: FrameDeltas, worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<SurveyTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<SurveyTask>())
            .unzip();

        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker, mut receiver)| {
                let deltas = deltas.clone();
                tokio::spawn(async move {
                    while let Some(task) = receiver.recv().await {
                        debug!(worker, index = task.index, "surveying delta");
                        let report = Self::survey(deltas.clone(), task.index).await;
                        let _ = task.result_sender.send(report);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            workers,
        }
    }

    async fn survey(deltas: FrameDeltas, index: usize) -> Result<DeltaReport> {
        tokio::task::spawn_blocking(move || -> Result<DeltaReport> {
            let before = index
                .checked_sub(1)
                .ok_or(VisionError::FrameIndexOutOfRange {
                    index,
                    len: deltas.len(),
                })?;
            let previous = deltas.path(before)?.to_path_buf();
            let current = deltas.path(index)?.to_path_buf();
            let blobs = deltas.delta_blobs(before, index)?;
            Ok(DeltaReport {
                index,
                previous,
                current,
                blobs,
            })
        })
        .await
        .map_err(|e| VisionError::Worker(e.to_string()))?
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queues the delta ending at frame `index` and waits for its report.
    pub async fn survey_pair(&self, index: usize) -> Result<DeltaReport> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(SurveyTask {
                index,
                result_sender,
            })
            .map_err(|_| VisionError::Worker("failed to send task to worker pool".into()))?;

        result_receiver
            .await
            .map_err(|_| VisionError::Worker("failed to receive result from worker".into()))?
    }
}

/// Labels every consecutive frame pair of a frame list in parallel.
pub struct ParallelSurvey {
    worker_pool: WorkerPool,
    frame_count: usize,
}

impl ParallelSurvey {
    /// Uses one worker per logical CPU.
    pub fn new(config: &PipelineConfig, frames: Vec<PathBuf>) -> Result<Self> {
        Self::with_workers(config, frames, num_cpus::get())
    }

    pub fn with_workers(
        config: &PipelineConfig,
        frames: Vec<PathBuf>,
        worker_count: usize,
    ) -> Result<Self> {
        config.validate()?;
        let frame_count = frames.len();
        Ok(Self {
            worker_pool: WorkerPool::new(FrameDeltas::new(config, frames), worker_count),
            frame_count,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_pool.worker_count()
    }

    /// One report per delta, in frame order. The first failure is returned.
    pub async fn run(&self) -> Result<Vec<DeltaReport>> {
        let reports = join_all((1..self.frame_count).map(|i| self.worker_pool.survey_pair(i)))
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;
        info!(
            deltas = reports.len(),
            workers = self.worker_count(),
            "survey finished"
        );
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{exact_config, write_frames};

    #[tokio::test]
    async fn reports_come_back_in_frame_order() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(
            dir.path(),
            &[None, Some((5, 5)), Some((5, 5)), Some((25, 5)), None],
        );
        let survey = ParallelSurvey::with_workers(&exact_config(), frames.clone(), 3).unwrap();
        let reports = survey.run().await.unwrap();

        let indices: Vec<_> = reports.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
        let counts: Vec<_> = reports.iter().map(|r| r.blobs.len()).collect();
        assert_eq!(counts, vec![1, 0, 2, 1]);
        assert_eq!(reports[0].previous, frames[0]);
        assert_eq!(reports[0].current, frames[1]);
    }

    #[tokio::test]
    async fn fewer_than_two_frames_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let frames = write_frames(dir.path(), &[None]);
        let survey = ParallelSurvey::with_workers(&exact_config(), frames, 2).unwrap();
        assert!(survey.run().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_frame_fails_the_survey() {
        let dir = tempfile::tempdir().unwrap();
        let mut frames = write_frames(dir.path(), &[None, Some((5, 5))]);
        frames.push(dir.path().join("missing.png"));
        let survey = ParallelSurvey::with_workers(&exact_config(), frames, 2).unwrap();
        assert!(survey.run().await.is_err());
    }

    #[tokio::test]
    async fn pool_never_has_zero_workers() {
        let survey = ParallelSurvey::with_workers(&exact_config(), Vec::new(), 0).unwrap();
        assert_eq!(survey.worker_count(), 1);
    }
}
