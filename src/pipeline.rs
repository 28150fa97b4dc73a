//! Output sink: the `Pipeline` trait and a console-writing implementation.
//!
//! The engine starts its pipeline before any request is dispatched, forwards
//! every extracted item and file to it one call at a time, and stops it only
//! after all processing tasks have drained. `stop` is where implementations
//! flush buffered output.

use crate::context::{FileRecord, Item};
use crate::error::CrawlerError;
use async_trait::async_trait;
use kanal::{AsyncSender, bounded_async};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Returns the name of the pipeline.
    fn name(&self) -> &str;

    async fn start(&self) -> Result<(), CrawlerError>;

    /// Flushes pending output and closes the intake.
    async fn stop(&self) -> Result<(), CrawlerError>;

    async fn collect_data(&self, item: Item);

    async fn collect_file(&self, file: FileRecord);
}

enum Record {
    Data(Item),
    File(FileRecord),
}

struct Intake {
    tx: AsyncSender<Record>,
    writer: JoinHandle<()>,
}

/// Writes each item to stdout as a JSON line from a background task.
///
/// Files are not written; only their name and size are printed.
pub struct ConsolePipeline {
    capacity: usize,
    intake: Mutex<Option<Intake>>,
}

impl ConsolePipeline {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            intake: Mutex::new(None),
        }
    }

    fn sender(&self) -> Option<AsyncSender<Record>> {
        self.intake.lock().as_ref().map(|intake| intake.tx.clone())
    }

    async fn send(&self, record: Record) {
        match self.sender() {
            Some(tx) => {
                if tx.send(record).await.is_err() {
                    error!("Console pipeline writer has exited, record dropped");
                }
            }
            None => warn!("Console pipeline is not started, record dropped"),
        }
    }
}

impl Default for ConsolePipeline {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Pipeline for ConsolePipeline {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<(), CrawlerError> {
        let mut intake = self.intake.lock();
        if intake.is_some() {
            return Err(CrawlerError::PipelineError(
                "console pipeline already started".to_string(),
            ));
        }

        let (tx, rx) = bounded_async::<Record>(self.capacity);
        let writer = tokio::spawn(async move {
            trace!("Console pipeline writer started");
            while let Ok(record) = rx.recv().await {
                match record {
                    Record::Data(item) => match serde_json::to_string(&item) {
                        Ok(line) => println!("{}", line),
                        Err(e) => error!("Failed to serialize item from {}: {}", item.url, e),
                    },
                    Record::File(file) => {
                        println!("[file] {} ({} bytes)", file.name, file.bytes.len())
                    }
                }
            }
            trace!("Console pipeline writer finished");
        });
        *intake = Some(Intake { tx, writer });
        debug!("Console pipeline started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CrawlerError> {
        let intake = self.intake.lock().take();
        let Some(Intake { tx, writer }) = intake else {
            return Err(CrawlerError::PipelineError(
                "console pipeline is not running".to_string(),
            ));
        };
        drop(tx);
        writer
            .await
            .map_err(|e| CrawlerError::PipelineError(format!("console writer failed: {}", e)))?;
        debug!("Console pipeline stopped");
        Ok(())
    }

    async fn collect_data(&self, item: Item) {
        self.send(Record::Data(item)).await;
    }

    async fn collect_file(&self, file: FileRecord) {
        self.send(Record::File(file)).await;
    }
}
