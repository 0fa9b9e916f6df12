//! Map stage: turn one chunk file into `(word, 1)` tuples.

use std::path::{Path, PathBuf};

use log;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chunk::DEFAULT_BUFFER_SIZE;
use crate::error::{IoContext, Result, WordCountError};
use crate::shuffle::{PartitionedQueue, Partitioner};

pub struct Mapper {
    queues: Vec<PartitionedQueue>,
    partitioner: Partitioner,
    chunk_file: PathBuf,
}

impl Mapper {
    pub fn new<P: Into<PathBuf>>(queues: Vec<PartitionedQueue>, chunk_file: P) -> Result<Mapper> {
        if queues.is_empty() {
            return Err(WordCountError::configuration(
                "mapper needs at least one partition queue",
            ));
        }

        Ok(Mapper {
            partitioner: Partitioner::new(queues.len()),
            queues,
            chunk_file: chunk_file.into(),
        })
    }

    pub fn chunk_file(&self) -> &Path {
        &self.chunk_file
    }

    /// Rebind to the queues of a new run.
    pub fn refresh_queues(&mut self, queues: Vec<PartitionedQueue>) -> Result<()> {
        if queues.is_empty() {
            return Err(WordCountError::configuration(
                "mapper needs at least one partition queue",
            ));
        }

        self.partitioner = Partitioner::new(queues.len());
        self.queues = queues;
        Ok(())
    }

    /// Publish every word of the chunk to its partition, returns the number of
    /// tuples sent.
    ///
    /// The queues are left open: several mappers share them and closing is up to
    /// whoever knows that all of them are done.
    pub async fn map(&self) -> Result<usize> {
        if !self.reducers_alive() {
            return Err(WordCountError::protocol(format!(
                "mapper for {} called after its queues were finished",
                self.chunk_file.display()
            )));
        }

        log::debug!("Map chunk {}", self.chunk_file.display());

        let file = File::open(&self.chunk_file).await.at(&self.chunk_file)?;
        let mut reader = BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file);

        let mut line = Vec::new();
        let mut sent = 0;

        loop {
            line.clear();

            let read = reader
                .read_until(b'\n', &mut line)
                .await
                .at(&self.chunk_file)?;
            if read == 0 {
                break;
            }

            for word in String::from_utf8_lossy(&line).split_whitespace() {
                let index = self.partitioner.index_of(word);

                log::trace!("Send word {} to partition index {}", word, index);

                self.queues[index].send((word.to_string(), 1))?;
                sent += 1;
            }
        }

        log::debug!(
            "Chunk {} mapped into {} tuples",
            self.chunk_file.display(),
            sent
        );

        Ok(sent)
    }

    fn reducers_alive(&self) -> bool {
        self.queues.iter().all(|queue| !queue.is_finished())
    }
}
