use connectors::{error::SourceError, source::DataLoader};
use model::records::batch::Batch;
use tracing::debug;

/// Draws records from a loader and shapes them into batches of the
/// configured size. Batching is the engine's concern; the loader only hands
/// out records.
pub struct Batcher {
    loader: Box<dyn DataLoader>,
    batch_size: usize,
    exhausted: bool,
}

impl Batcher {
    pub fn new(loader: Box<dyn DataLoader>, batch_size: usize) -> Self {
        Self {
            loader,
            batch_size: batch_size.max(1),
            exhausted: false,
        }
    }

    /// Next batch, or `None` once the source is exhausted. The final batch
    /// may be short.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>, SourceError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(self.batch_size);
        while records.len() < self.batch_size {
            match self.loader.next_record().await? {
                Some(record) => records.push(record),
                None => {
                    self.exhausted = true;
                    break;
                }
            }
        }

        if records.is_empty() {
            return Ok(None);
        }

        let batch = Batch::new(records);
        debug!(batch_id = %batch.id, records = batch.len(), "Drew batch from source");
        Ok(Some(batch))
    }
}
