//! MapReduce based implementation.
//!
//! The workflow is illustrated as following:
//!
//! The input is split into chunk files first. One mapper task per chunk and one
//! reducer task per partition then run side by side: mappers publish into the
//! partition queues while reducers drain them. The mappers run as one nested
//! group, and only once every mapper of the group is done are the queues
//! finished, which lets the reducers write their output files.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use log;
use tokio::task::{self, JoinSet};

use crate::chunk::Splitter;
use crate::config::Config;
use crate::error::Result;
use crate::map::Mapper;
use crate::reduce::Reducer;
use crate::shuffle::{PartitionedQueue, QueueStream};
use crate::store::{ScratchStore, SledStore};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub chunks: usize,
    pub tuples: usize,
    /// One file per partition, ordered by partition number.
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
}

enum Finished {
    Mapped(usize),
    Reduced(usize, PathBuf),
}

pub struct MapReduce {
    config: Config,
}

impl MapReduce {
    pub fn new(config: Config) -> Result<MapReduce> {
        config.validate()?;
        Ok(MapReduce { config })
    }

    /// Run the whole pipeline. Chunk files are removed afterwards whether the run
    /// succeeded or not.
    pub async fn run(&self) -> Result<RunSummary> {
        let start = Instant::now();

        let splitter =
            Splitter::new(&self.config.chunk_dir).with_buffer_size(self.config.buffer_size);
        let planned = splitter.chunk_paths(self.config.mappers);

        let result = self.split_and_process(&splitter).await;

        log::info!("Deleting temporary chunk files");
        splitter.delete_chunk_files(&planned);

        let (chunks, tuples, outputs) = result?;

        Ok(RunSummary {
            chunks,
            tuples,
            outputs,
            elapsed: start.elapsed(),
        })
    }

    async fn split_and_process(
        &self,
        splitter: &Splitter,
    ) -> Result<(usize, usize, Vec<PathBuf>)> {
        let input = self.config.input.clone();
        let mappers = self.config.mappers;
        let task_splitter = splitter.clone();

        let chunks =
            task::spawn_blocking(move || task_splitter.split(&input, mappers)).await??;
        let chunk_count = chunks.len();

        let (queues, streams): (Vec<_>, Vec<_>) = (0..self.config.reducers)
            .map(PartitionedQueue::channel)
            .unzip();

        let reducers = self.build_reducers(streams)?;

        log::info!(
            "Starting map reduce with {} mappers and {} reducers",
            chunk_count,
            reducers.len()
        );

        let (tuples, outputs) = run_tasks(queues, chunks, reducers).await?;

        Ok((chunk_count, tuples, outputs))
    }

    fn build_reducers(&self, streams: Vec<QueueStream>) -> Result<Vec<Reducer<SledStore>>> {
        streams
            .into_iter()
            .map(|stream| {
                let reducer_number = stream.partition() + 1;
                let store = SledStore::for_partition(&self.config.scratch_dir, reducer_number)?;

                Reducer::new(
                    reducer_number,
                    stream,
                    store,
                    self.config.flush_threshold,
                    &self.config.output_dir,
                )
            })
            .collect()
    }
}

/// Run the mapper group next to the reducers and collect the output files,
/// ordered by reducer number. The first task error is returned.
async fn run_tasks<S: ScratchStore + 'static>(
    queues: Vec<PartitionedQueue>,
    chunks: Vec<PathBuf>,
    reducers: Vec<Reducer<S>>,
) -> Result<(usize, Vec<PathBuf>)> {
    let mut tasks = JoinSet::new();
    let mut outputs = Vec::with_capacity(reducers.len());

    tasks.spawn(async move { map_group(queues, chunks).await.map(Finished::Mapped) });

    for mut reducer in reducers {
        let reducer_number = reducer.reducer_number();

        tasks.spawn(async move {
            reducer
                .reduce()
                .await
                .map(|output| Finished::Reduced(reducer_number, output))
        });
    }

    let mut tuples = 0;

    // Dropping the set on the first error aborts the tasks still running.
    while let Some(joined) = tasks.join_next().await {
        match joined?? {
            Finished::Mapped(count) => tuples = count,
            Finished::Reduced(reducer_number, path) => outputs.push((reducer_number, path)),
        }
    }

    outputs.sort_by_key(|(reducer_number, _)| *reducer_number);

    Ok((tuples, outputs.into_iter().map(|(_, path)| path).collect()))
}

/// Run one mapper per chunk, then finish every queue. Returns the number of
/// tuples published.
///
/// Finishing only happens once the whole group has completed: a queue closed
/// while some mapper can still write to it would lose counts.
async fn map_group(queues: Vec<PartitionedQueue>, chunks: Vec<PathBuf>) -> Result<usize> {
    let mut mappers = JoinSet::new();

    for chunk in chunks {
        let queues = queues.clone();

        mappers.spawn(run_mapper(queues, chunk));
    }

    let mut tuples = 0;

    while let Some(joined) = mappers.join_next().await {
        tuples += joined??;
    }

    for queue in queues.iter() {
        queue.finish();
    }

    log::info!("Map phase published {} tuples", tuples);

    Ok(tuples)
}

async fn run_mapper(queues: Vec<PartitionedQueue>, chunk: PathBuf) -> Result<usize> {
    let mapper = Mapper::new(queues, chunk)?;
    mapper.map().await
}
