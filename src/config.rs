//! Run configuration.

use std::env;
use std::path::PathBuf;

use crate::chunk::DEFAULT_BUFFER_SIZE;
use crate::error::{Result, WordCountError};
use crate::reduce::DEFAULT_FLUSH_THRESHOLD;

pub const DEFAULT_INPUT: &str = "input.txt";

pub const DEFAULT_MAPPERS: usize = 20;

pub const DEFAULT_REDUCERS: usize = 10;

pub const DEFAULT_OUTPUT_DIR: &str = "Output";

const CHUNK_DIR_NAME: &str = "word-count";

const SCRATCH_DIR_NAME: &str = "ReducerDb";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Text file to count words of.
    pub input: PathBuf,
    /// Number of chunks, one mapper task runs per chunk.
    pub mappers: usize,
    /// Number of partitions, one reducer task runs per partition.
    pub reducers: usize,
    /// Tuples a reducer sums in memory before spilling to its scratch store.
    pub flush_threshold: usize,
    /// Size of the splitter read and write buffers.
    pub buffer_size: usize,
    pub output_dir: PathBuf,
    pub chunk_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Config {
        let tmp = env::temp_dir();

        Config {
            input: PathBuf::from(DEFAULT_INPUT),
            mappers: DEFAULT_MAPPERS,
            reducers: DEFAULT_REDUCERS,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            buffer_size: DEFAULT_BUFFER_SIZE,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            chunk_dir: tmp.join(CHUNK_DIR_NAME),
            scratch_dir: tmp.join(SCRATCH_DIR_NAME),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.mappers, "number of mappers"),
            (self.reducers, "number of reducers"),
            (self.flush_threshold, "flush threshold"),
            (self.buffer_size, "buffer size"),
        ];

        for (value, name) in checks.iter() {
            if *value == 0 {
                return Err(WordCountError::configuration(format!(
                    "{} must be at least 1",
                    name
                )));
            }
        }

        Ok(())
    }
}
