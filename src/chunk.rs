//! Split the input file into line aligned chunk files.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log;

use crate::error::{IoContext, Result, WordCountError};

/// Read and write buffers are bounded to 1MB each.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

const CHUNK_FILE_PREFIX: &str = "chunk.part";

/// Target size of every chunk but the last one, which takes the remainder.
#[inline]
pub fn chunk_size(file_size: u64, number_of_splits: usize) -> u64 {
    file_size / number_of_splits as u64
}

#[derive(Clone, Debug)]
pub struct Splitter {
    chunk_dir: PathBuf,
    buffer_size: usize,
}

impl Splitter {
    pub fn new<P: Into<PathBuf>>(chunk_dir: P) -> Splitter {
        Splitter {
            chunk_dir: chunk_dir.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Splitter {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Paths of the chunk files `split` writes for the given number of splits.
    pub fn chunk_paths(&self, number_of_splits: usize) -> Vec<PathBuf> {
        (0..number_of_splits)
            .map(|idx| {
                self.chunk_dir
                    .join(format!("{}{}", CHUNK_FILE_PREFIX, idx + 1))
            })
            .collect()
    }

    /// Split `file_path` into exactly `number_of_splits` chunk files.
    ///
    /// A line always goes whole into the chunk that is current when its first byte
    /// is read. The splitter moves on to the next chunk once the current one holds
    /// at least `chunk_size` bytes, the last chunk takes whatever remains. Some
    /// chunks may end up empty when the input is small or has long lines.
    pub fn split<P: AsRef<Path>>(
        &self,
        file_path: P,
        number_of_splits: usize,
    ) -> Result<Vec<PathBuf>> {
        let input = file_path.as_ref();

        if number_of_splits == 0 {
            return Err(WordCountError::configuration(
                "number of splits must be at least 1",
            ));
        }

        let file = File::open(input).at(input)?;
        let file_size = file.metadata().at(input)?.len();
        let chunk_size = chunk_size(file_size, number_of_splits);

        log::info!(
            "Split {} ({} bytes) into {} chunks of about {} bytes",
            input.display(),
            file_size,
            number_of_splits,
            chunk_size
        );

        fs::create_dir_all(&self.chunk_dir).at(&self.chunk_dir)?;

        let chunk_files = self.chunk_paths(number_of_splits);
        let mut reader = BufReader::with_capacity(self.buffer_size, file);

        let mut current = 0;
        let mut bytes_in_current: u64 = 0;
        let mut writer = self.create_chunk(&chunk_files[current])?;
        let mut line = Vec::new();

        loop {
            line.clear();

            let read = reader.read_until(b'\n', &mut line).at(input)?;
            if read == 0 {
                break;
            }

            writer.write_all(&line).at(&chunk_files[current])?;
            bytes_in_current += read as u64;

            if bytes_in_current >= chunk_size && current + 1 < number_of_splits {
                writer.flush().at(&chunk_files[current])?;

                log::debug!(
                    "Chunk {} done with {} bytes",
                    chunk_files[current].display(),
                    bytes_in_current
                );

                current += 1;
                bytes_in_current = 0;
                writer = self.create_chunk(&chunk_files[current])?;
            }
        }

        writer.flush().at(&chunk_files[current])?;

        // Chunks after the current one received no line, they are left empty.
        for path in &chunk_files[current + 1..] {
            File::create(path).at(path)?;
        }

        Ok(chunk_files)
    }

    /// Remove chunk files, a failing removal is logged and skipped.
    pub fn delete_chunk_files(&self, files: &[PathBuf]) -> usize {
        let mut removed = 0;

        for path in files {
            match fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(err) => log::warn!("Failed to delete chunk file {}: {}", path.display(), err),
            }
        }

        removed
    }

    fn create_chunk(&self, path: &Path) -> Result<BufWriter<File>> {
        log::trace!("Create chunk file {}", path.display());

        let file = File::create(path).at(path)?;

        Ok(BufWriter::with_capacity(self.buffer_size, file))
    }
}
