//! Running long passes off the calling thread.
//!
//! The worker takes ownership of the [`LayerFile`] for the duration of the
//! task and hands it back on [`LayerWorker::join`], so no two passes can ever
//! touch the same layers at once.

use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use crate::file::layer_file::{FixReport, LayerFile};
use crate::utils::error::{LayerError, Result};
use crate::utils::progress::{BatchedProgress, CancelToken, ProgressSink};
use log::{error, info};

/// A pass running on a dedicated thread.
pub struct LayerWorker<T> {
    handle: JoinHandle<(LayerFile, Result<T>)>,
    messages: Receiver<String>,
    cancel: CancelToken,
}

/// The worker running [`LayerFile::fix_layers`].
pub type FixWorker = LayerWorker<FixReport>;

impl<T: Send + 'static> LayerWorker<T> {
    /// Moves `file` to a new thread and runs `task` on it.
    ///
    /// Progress is forwarded in batches of `batch_size` messages. A failure
    /// is also reported as a progress message, and `"Done."` ends every run.
    pub fn spawn<F>(mut file: LayerFile, batch_size: usize, task: F) -> Result<Self>
    where
        F: FnOnce(&mut LayerFile, &dyn ProgressSink, &CancelToken) -> Result<T> + Send + 'static,
    {
        let (sender, messages) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("layer-worker".to_string())
            .spawn(move || {
                let progress = BatchedProgress::new(sender, batch_size);
                let result = task(&mut file, &progress, &token);
                if let Err(e) = &result {
                    error!("Layer task failed: {}", e);
                    progress.show_info(&e.to_string());
                }
                progress.show_info("Done.");
                progress.flush();
                (file, result)
            })?;
        Ok(LayerWorker {
            handle,
            messages,
            cancel,
        })
    }

    /// Batches of progress messages, newline separated.
    pub fn messages(&self) -> &Receiver<String> {
        &self.messages
    }

    /// Asks the task to stop before its next layer.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the task and returns the file with the task's result.
    pub fn join(self) -> Result<(LayerFile, Result<T>)> {
        self.handle.join().map_err(|_| {
            LayerError::InconsistentLayerState("layer worker thread panicked".to_string())
        })
    }
}

impl LayerWorker<FixReport> {
    /// Runs the fix procedure with the file's own progress batch size.
    pub fn fix(file: LayerFile) -> Result<Self> {
        let batch_size = file.params().progress_batch_size;
        info!("Starting fix of {} layers", file.layer_count());
        Self::spawn(file, batch_size, |file, progress, cancel| {
            file.fix_layers(progress, Some(cancel))
        })
    }
}

impl LayerWorker<()> {
    /// Runs the full classification pass.
    pub fn calculate(file: LayerFile) -> Result<Self> {
        let batch_size = file.params().progress_batch_size;
        Self::spawn(file, batch_size, |file, progress, cancel| {
            file.calculate(progress, Some(cancel))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::params::AnalysisParams;
    use crate::image::geom::Resolution;
    use crate::layer::{Layer, LayerDefinition};

    fn empty_file(layers: usize) -> LayerFile {
        let layers = (0..layers)
            .map(|_| Layer::new(LayerDefinition::default(), vec![0x10]))
            .collect();
        LayerFile::new(
            Resolution::new(4, 4),
            layers,
            AnalysisParams::new().with_progress_batch_size(4),
        )
        .unwrap()
    }

    #[test]
    fn worker_returns_the_file() -> Result<()> {
        let worker = LayerWorker::<()>::calculate(empty_file(3))?;
        let (file, result) = worker.join()?;
        result?;
        assert!(file.is_calculated());
        Ok(())
    }

    #[test]
    fn messages_arrive_in_batches() -> Result<()> {
        let worker = LayerWorker::<()>::calculate(empty_file(6))?;
        // The sender is dropped with the thread, so the iterator ends.
        let batches: Vec<String> = worker.messages().iter().collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].lines().count(), 4);
        assert_eq!(batches[1].lines().last(), Some("Done."));
        let (_, result) = worker.join()?;
        result
    }

    #[test]
    fn failure_is_reported_and_file_returned() -> Result<()> {
        let worker = LayerWorker::spawn(empty_file(1), 10, |_, _, _| -> Result<()> {
            Err(LayerError::InvalidArg("nothing to do".to_string()))
        })?;
        let messages = worker.messages().iter().collect::<Vec<_>>().join("\n");
        assert!(messages.contains("nothing to do"));
        let (file, result) = worker.join()?;
        assert!(result.is_err());
        assert_eq!(file.layer_count(), 1);
        Ok(())
    }

    #[test]
    fn cancel_reaches_the_running_task() -> Result<()> {
        let worker = LayerWorker::spawn(empty_file(1), 10, |_, _, cancel| -> Result<()> {
            while !cancel.is_cancelled() {
                std::thread::yield_now();
            }
            Err(LayerError::Cancelled { layer: 0 })
        })?;
        worker.cancel();
        let (_, result) = worker.join()?;
        assert!(matches!(result, Err(LayerError::Cancelled { layer: 0 })));
        Ok(())
    }

    #[test]
    fn cancelled_fix_keeps_layers_intact() -> Result<()> {
        let file = empty_file(2);
        let worker = LayerWorker::spawn(file, 10, |file, progress, cancel| {
            cancel.cancel();
            file.fix_layers(progress, Some(cancel))
        })?;
        let (file, result) = worker.join()?;
        assert!(matches!(result, Err(LayerError::Cancelled { layer: 0 })));
        assert!(file.layers().iter().all(|l| l.packed_classification().is_none()));
        Ok(())
    }
}
