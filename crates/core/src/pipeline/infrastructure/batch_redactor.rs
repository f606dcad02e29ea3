use std::path::PathBuf;
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use crate::imaging::domain::image_reader::ImageReader;
use crate::imaging::domain::image_writer::ImageWriter;
use crate::pipeline::privacy_protector::{PrivacyProtector, ProtectionSummary};
use crate::shared::pixel_buffer::PixelBuffer;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchJob {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Result for one job. Errors are flattened to messages so outcomes can
/// cross threads and be reported together.
#[derive(Debug)]
pub struct BatchOutcome {
    pub job: BatchJob,
    pub result: Result<ProtectionSummary, String>,
}

/// A job tagged with its position in the batch.
struct Tagged<T> {
    index: usize,
    job: BatchJob,
    payload: T,
}

/// Redacts many image files with dedicated threads for I/O.
///
/// Layout: `reader → N workers [detect/blur] → writer`
///
/// Each worker owns its own [`PrivacyProtector`] and one buffer at a time;
/// the protectors share the model provider they were built with. A file that
/// cannot be read, redacted or written yields a failed outcome and the batch
/// carries on.
pub struct BatchRedactor {
    workers: usize,
    channel_capacity: usize,
}

impl BatchRedactor {
    pub fn new(workers: usize, channel_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn with_workers(workers: usize) -> Self {
        Self::new(workers, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Processes every job and returns the outcomes in job order.
    pub fn run<F>(
        &self,
        jobs: Vec<BatchJob>,
        reader: Box<dyn ImageReader>,
        writer: Box<dyn ImageWriter>,
        make_protector: F,
    ) -> Vec<BatchOutcome>
    where
        F: Fn() -> PrivacyProtector + Sync,
    {
        let cap = self.channel_capacity;
        let (read_tx, read_rx) = crossbeam_channel::bounded::<Tagged<PixelBuffer>>(cap);
        let (write_tx, write_rx) =
            crossbeam_channel::bounded::<Tagged<(PixelBuffer, ProtectionSummary)>>(cap);
        let (done_tx, done_rx) =
            crossbeam_channel::unbounded::<Tagged<Result<ProtectionSummary, String>>>();

        log::info!(
            "Redacting {} image(s) with {} worker(s)",
            jobs.len(),
            self.workers
        );

        let make_protector = &make_protector;
        thread::scope(|s| {
            let reader_done = done_tx.clone();
            s.spawn(move || read_all(reader, jobs, read_tx, reader_done));

            for worker in 0..self.workers {
                let rx = read_rx.clone();
                let tx = write_tx.clone();
                let worker_done = done_tx.clone();
                s.spawn(move || {
                    let protector = make_protector();
                    redact_all(worker, &protector, rx, tx, worker_done);
                });
            }
            drop(read_rx);
            drop(write_tx);

            s.spawn(move || write_all(writer, write_rx, done_tx));
        });

        let mut outcomes: Vec<_> = done_rx.iter().collect();
        outcomes.sort_by_key(|t| t.index);
        outcomes
            .into_iter()
            .map(|t| BatchOutcome {
                job: t.job,
                result: t.payload,
            })
            .collect()
    }
}

impl Default for BatchRedactor {
    fn default() -> Self {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_workers(workers)
    }
}

fn read_all(
    reader: Box<dyn ImageReader>,
    jobs: Vec<BatchJob>,
    read_tx: Sender<Tagged<PixelBuffer>>,
    done_tx: Sender<Tagged<Result<ProtectionSummary, String>>>,
) {
    for (index, job) in jobs.into_iter().enumerate() {
        match reader.read(&job.input) {
            Ok(buffer) => {
                let tagged = Tagged {
                    index,
                    job,
                    payload: buffer,
                };
                if read_tx.send(tagged).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Skipping {}: {e}", job.input.display());
                let _ = done_tx.send(Tagged {
                    index,
                    job,
                    payload: Err(e.to_string()),
                });
            }
        }
    }
}

fn redact_all(
    worker: usize,
    protector: &PrivacyProtector,
    read_rx: Receiver<Tagged<PixelBuffer>>,
    write_tx: Sender<Tagged<(PixelBuffer, ProtectionSummary)>>,
    done_tx: Sender<Tagged<Result<ProtectionSummary, String>>>,
) {
    for Tagged {
        index,
        job,
        payload: mut buffer,
    } in read_rx
    {
        let summary = protector.apply_privacy_protection(&mut buffer);
        log::debug!(
            "Worker {worker}: {} -> {} region(s) blurred",
            job.input.display(),
            summary.total_blurred
        );
        let tagged = Tagged {
            index,
            job,
            payload: (buffer, summary),
        };
        if let Err(unsent) = write_tx.send(tagged) {
            let Tagged { index, job, .. } = unsent.into_inner();
            let _ = done_tx.send(Tagged {
                index,
                job,
                payload: Err("writer stopped before the image was saved".to_string()),
            });
            break;
        }
    }
}

fn write_all(
    writer: Box<dyn ImageWriter>,
    write_rx: Receiver<Tagged<(PixelBuffer, ProtectionSummary)>>,
    done_tx: Sender<Tagged<Result<ProtectionSummary, String>>>,
) {
    for Tagged {
        index,
        job,
        payload: (buffer, summary),
    } in write_rx
    {
        let result = writer
            .write(&job.output, &buffer)
            .map(|()| summary)
            .map_err(|e| {
                log::warn!("Failed to save {}: {e}", job.output.display());
                e.to_string()
            });
        let _ = done_tx.send(Tagged {
            index,
            job,
            payload: result,
        });
    }
}
