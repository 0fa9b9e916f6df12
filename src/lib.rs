//! Count words of a large text file with a single-machine MapReduce pipeline.
//!
//! The input is split into line aligned chunks, mappers count words of each chunk
//! in parallel, the partial counts are shuffled by word hash into one queue per
//! partition and reducers merge them with bounded memory, spilling into a
//! scratch store on disk. Each partition ends up in its own `<n>.r` output file.

use log;

pub mod chunk;
pub mod config;
pub mod entry;
pub mod error;
pub mod map;
pub mod map_reduce;
pub mod reduce;
pub mod shuffle;
pub mod store;

pub use crate::config::Config;
pub use crate::error::{Result, WordCountError};
pub use crate::map_reduce::{MapReduce, RunSummary};

/// Main entry function for counting the words of `config.input`.
pub async fn count_words(config: Config) -> Result<RunSummary> {
    log::info!(
        "Count words of file {} with {} mappers and {} reducers",
        config.input.display(),
        config.mappers,
        config.reducers
    );

    match internal_process(config).await {
        Ok(summary) => {
            log::info!(
                "Completed in {:.3} seconds, {} partition files written",
                summary.elapsed.as_secs_f64(),
                summary.outputs.len()
            );
            Ok(summary)
        }
        Err(error) => {
            log::error!("Failed to count words, cause: {}", error);
            Err(error)
        }
    }
}

async fn internal_process(config: Config) -> Result<RunSummary> {
    MapReduce::new(config)?.run().await
}
