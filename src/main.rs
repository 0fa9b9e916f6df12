//! Count words of a large text file with a single-machine MapReduce pipeline.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger;
use log;

use word_count::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "word-count", about = "Count words of a large text file")]
struct Args {
    /// Text file to count the words of
    #[arg(default_value = word_count::config::DEFAULT_INPUT)]
    input: PathBuf,

    /// Number of chunks, one mapper runs per chunk
    #[arg(short, long, default_value_t = word_count::config::DEFAULT_MAPPERS)]
    mappers: usize,

    /// Number of partitions, one reducer and one output file per partition
    #[arg(short, long, default_value_t = word_count::config::DEFAULT_REDUCERS)]
    reducers: usize,

    /// Tuples summed in memory before a reducer spills to its scratch store
    #[arg(long, default_value_t = word_count::reduce::DEFAULT_FLUSH_THRESHOLD)]
    flush_threshold: usize,

    /// Directory receiving the `<partition>.r` files
    #[arg(short, long, default_value = word_count::config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            input: self.input,
            mappers: self.mappers,
            reducers: self.reducers,
            flush_threshold: self.flush_threshold,
            output_dir: self.output_dir,
            ..Config::default()
        }
    }
}

#[tokio::main]
async fn main() {
    let env = env_logger::Env::default().filter_or("RUST_LOG", "info");

    env_logger::init_from_env(env);

    let config = Args::parse().into_config();

    match word_count::count_words(config).await {
        Ok(summary) => log::info!(
            "Counted {} words from {} chunks into {} files, temporary files removed",
            summary.tuples,
            summary.chunks,
            summary.outputs.len()
        ),
        Err(error) => {
            eprintln!("There was an error during execution: {}", error);
            process::exit(1);
        }
    }
}
