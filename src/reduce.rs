//! Reducer
//!
//! A reducer owns one partition. It sums the tuples of its queue in memory and
//! spills the partial sums into its scratch store every `flush_threshold`
//! tuples, so the memory use is bounded by the number of distinct words seen
//! between two spills rather than by the size of the partition. Once the queue is
//! finished the store holds the final counts, which are streamed to the
//! partition output file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use log;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task;

use crate::entry::Entry;
use crate::error::{IoContext, Result, WordCountError};
use crate::shuffle::QueueStream;
use crate::store::ScratchStore;

pub const DEFAULT_FLUSH_THRESHOLD: usize = 100_000;

const OUTPUT_FILE_EXTENSION: &str = "r";

pub struct Reducer<S: ScratchStore> {
    reducer_number: usize,
    stream: QueueStream,
    store: S,
    accumulator: HashMap<String, i64>,
    flush_threshold: usize,
    items_processed: usize,
    output_dir: PathBuf,
}

impl<S: ScratchStore> Reducer<S> {
    /// Bind a reducer to its queue. The store is cleared so nothing left over by
    /// an earlier run leaks into the counts.
    pub fn new<P: Into<PathBuf>>(
        reducer_number: usize,
        stream: QueueStream,
        mut store: S,
        flush_threshold: usize,
        output_dir: P,
    ) -> Result<Reducer<S>> {
        if flush_threshold == 0 {
            return Err(WordCountError::configuration(
                "flush threshold must be at least 1",
            ));
        }

        store.clear_all()?;

        Ok(Reducer {
            reducer_number,
            stream,
            store,
            accumulator: HashMap::new(),
            flush_threshold,
            items_processed: 0,
            output_dir: output_dir.into(),
        })
    }

    pub fn reducer_number(&self) -> usize {
        self.reducer_number
    }

    /// `<output_dir>/<reducer_number>.r`
    pub fn output_file(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}.{}",
            self.reducer_number, OUTPUT_FILE_EXTENSION
        ))
    }

    /// Drain the queue until it is finished, then write the output file.
    pub async fn reduce(&mut self) -> Result<PathBuf> {
        log::debug!("Reducer {} starts draining", self.reducer_number);

        while let Some((key, delta)) = self.stream.next().await {
            self.process(key, delta)?;
        }

        let output = blocking(|| {
            self.spill()?;
            self.build_output_file()
        })?;

        // Cleared on creation and refresh anyway, this only avoids leaving the
        // scratch files around once the output exists.
        if let Err(err) = self.store.clear_all() {
            log::warn!(
                "Failed to clear scratch store of reducer {}: {}",
                self.reducer_number,
                err
            );
        }

        Ok(output)
    }

    /// Rebind to the queue of a new run.
    pub fn refresh(&mut self, stream: QueueStream) -> Result<()> {
        self.stream = stream;
        self.accumulator.clear();
        self.items_processed = 0;
        self.store.clear_all()
    }

    fn process(&mut self, key: String, delta: i64) -> Result<()> {
        *self.accumulator.entry(key).or_insert(0) += delta;
        self.items_processed += 1;

        if self.items_processed >= self.flush_threshold {
            blocking(|| self.spill())?;
            self.items_processed = 0;
        }

        Ok(())
    }

    /// Merge the accumulator into the scratch store and empty it.
    fn spill(&mut self) -> Result<()> {
        if self.accumulator.is_empty() {
            return Ok(());
        }

        log::trace!(
            "Reducer {} spills {} keys",
            self.reducer_number,
            self.accumulator.len()
        );

        for (key, sum) in self.accumulator.drain() {
            if self.store.exists(&key)? {
                let current = self.store.get(&key)?.unwrap_or(0);
                self.store.put(&key, current + sum)?;
            } else {
                self.store.put(&key, sum)?;
            }
        }

        Ok(())
    }

    fn build_output_file(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).at(&self.output_dir)?;

        let path = self.output_file();
        let file = File::create(&path).at(&path)?;
        let mut writer = BufWriter::new(file);

        let mut lines = 0;

        for item in self.store.entries() {
            let (raw_key, count) = item?;

            let key = match String::from_utf8(raw_key) {
                Ok(key) => key,
                Err(err) => {
                    log::warn!(
                        "Reducer {} skips a key that is not UTF-8: {:?}",
                        self.reducer_number,
                        err.as_bytes()
                    );
                    continue;
                }
            };

            writeln!(writer, "{}", Entry::new(key, count)).at(&path)?;
            lines += 1;
        }

        writer.flush().at(&path)?;

        log::info!(
            "Reducer {} wrote {} words to {}",
            self.reducer_number,
            lines,
            path.display()
        );

        Ok(path)
    }

    #[cfg(test)]
    fn store(&self) -> &S {
        &self.store
    }
}

/// Run synchronous store and file work. On a multi-threaded runtime the worker
/// hands its other tasks over first, a current-thread runtime runs it inline.
fn blocking<T, F: FnOnce() -> T>(work: F) -> T {
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => task::block_in_place(work),
        _ => work(),
    }
}

/// Parse an output file back into entries.
pub fn read_output_file<P: AsRef<Path>>(path: P) -> Result<Vec<Entry>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).at(path)?;

    content
        .lines()
        .map(|line| {
            let mut fields = line.rsplitn(2, ' ');
            let count = fields.next().and_then(|count| count.parse::<i64>().ok());
            let key = fields.next();

            match (key, count) {
                (Some(key), Some(count)) => Ok(Entry::new(key.to_string(), count)),
                _ => Err(WordCountError::io(
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("malformed output line {:?}", line),
                    ),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use crate::entry::Count;
    use crate::shuffle::PartitionedQueue;
    use crate::store::{FailingStore, MemoryStore};

    fn counts(entries: Vec<Entry>) -> BTreeMap<String, i64> {
        entries.into_iter().map(|e| (e.key, e.count)).collect()
    }

    fn send_words(queue: &PartitionedQueue, text: &str) {
        for word in text.split_whitespace() {
            queue.send((word.to_string(), 1)).unwrap();
        }
    }

    async fn reduce_text(dir: &TempDir, text: &str, threshold: usize) -> BTreeMap<String, i64> {
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer =
            Reducer::new(1, stream, MemoryStore::new(), threshold, dir.path()).unwrap();

        send_words(&queue, text);
        queue.finish();

        let output = reducer.reduce().await.unwrap();
        counts(read_output_file(output).unwrap())
    }

    #[tokio::test]
    async fn test_counts_words() {
        let dir = tempfile::tempdir().unwrap();

        let result = reduce_text(&dir, "a b a c b a\n", 100).await;

        let expect: BTreeMap<String, i64> =
            vec![("a".to_string(), 3), ("b".to_string(), 2), ("c".to_string(), 1)]
                .into_iter()
                .collect();
        assert_eq!(result, expect);
        assert!(dir.path().join("1.r").exists());
    }

    #[tokio::test]
    async fn test_threshold_does_not_change_counts() {
        let text = "x y z x y x w ".repeat(50);

        let every_tuple = reduce_text(&tempfile::tempdir().unwrap(), &text, 1).await;
        let every_seven = reduce_text(&tempfile::tempdir().unwrap(), &text, 7).await;
        let single_spill = reduce_text(&tempfile::tempdir().unwrap(), &text, 1_000_000).await;

        assert_eq!(every_tuple, single_spill);
        assert_eq!(every_seven, single_spill);
        assert_eq!(single_spill["x"], 150);
        assert_eq!(single_spill["w"], 50);
    }

    #[test]
    fn test_spill_merges_with_store() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, MemoryStore::new(), 2, dir.path()).unwrap();

        reducer.process("k".to_string(), 4).unwrap();
        reducer.process("k".to_string(), 5).unwrap();

        assert!(reducer.accumulator.is_empty());
        assert_eq!(reducer.store().get("k").unwrap(), Some(9));

        reducer.process("k".to_string(), 1).unwrap();
        reducer.spill().unwrap();

        assert_eq!(reducer.store().get("k").unwrap(), Some(10));
        drop(queue);
    }

    #[test]
    fn test_empty_spill_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (_queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, MemoryStore::new(), 10, dir.path()).unwrap();

        reducer.process("k".to_string(), 1).unwrap();
        reducer.spill().unwrap();
        reducer.spill().unwrap();

        assert_eq!(reducer.store().len(), 1);
        assert_eq!(reducer.store().get("k").unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_construction_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::new();
        store.put("stale", 99).unwrap();

        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(2, stream, store, 10, dir.path()).unwrap();

        send_words(&queue, "fresh");
        queue.finish();

        let output = reducer.reduce().await.unwrap();
        let result = counts(read_output_file(&output).unwrap());

        assert_eq!(output, dir.path().join("2.r"));
        assert_eq!(result.len(), 1);
        assert_eq!(result["fresh"], 1);
        assert!(reducer.store().is_empty());
    }

    #[tokio::test]
    async fn test_non_utf8_keys_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, MemoryStore::new(), 10, dir.path()).unwrap();

        reducer
            .store
            .put_raw(vec![0xff, 0xfe], Count::encode(5).to_vec());
        send_words(&queue, "ok ok");
        queue.finish();

        let output = reducer.reduce().await.unwrap();

        assert_eq!(fs::read_to_string(output).unwrap(), "ok 2\n");
    }

    #[tokio::test]
    async fn test_empty_queue_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();

        let result = reduce_text(&dir, "", 100).await;

        assert!(result.is_empty());
        assert_eq!(fs::read(dir.path().join("1.r")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_refresh_for_next_run() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, MemoryStore::new(), 3, dir.path()).unwrap();

        send_words(&queue, "first first run");
        queue.finish();
        reducer.reduce().await.unwrap();

        let (queue, stream) = PartitionedQueue::channel(0);
        reducer.refresh(stream).unwrap();

        send_words(&queue, "second run");
        queue.finish();

        let result = counts(read_output_file(reducer.reduce().await.unwrap()).unwrap());

        assert_eq!(result.len(), 2);
        assert_eq!(result["run"], 1);
        assert!(!result.contains_key("first"));
    }

    #[tokio::test]
    async fn test_output_dir_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("Output");
        fs::write(&blocker, "not a directory").unwrap();

        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, MemoryStore::new(), 10, &blocker).unwrap();
        queue.finish();

        assert!(matches!(
            reducer.reduce().await,
            Err(WordCountError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_reduce() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, FailingStore, 10, dir.path()).unwrap();

        send_words(&queue, "lost words");
        queue.finish();

        match reducer.reduce().await {
            Err(WordCountError::Store { operation, .. }) => assert_eq!(operation, "put"),
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!dir.path().join("1.r").exists());
    }

    #[tokio::test]
    async fn test_threshold_spill_failure_stops_draining() {
        let dir = tempfile::tempdir().unwrap();
        let (queue, stream) = PartitionedQueue::channel(0);
        let mut reducer = Reducer::new(1, stream, FailingStore, 2, dir.path()).unwrap();

        send_words(&queue, "a b c d");

        assert!(matches!(
            reducer.reduce().await,
            Err(WordCountError::Store { .. })
        ));
        assert!(!queue.is_finished());
        assert!(!dir.path().join("1.r").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reduce_on_multi_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let text = "p q p r p q ".repeat(20);

        let every_tuple = reduce_text(&dir, &text, 1).await;

        assert_eq!(every_tuple["p"], 60);
        assert_eq!(every_tuple["q"], 40);
        assert_eq!(every_tuple["r"], 20);
    }

    #[test]
    fn test_zero_threshold() {
        let (_queue, stream) = PartitionedQueue::channel(0);

        assert!(Reducer::new(1, stream, MemoryStore::new(), 0, "Output").is_err());
    }

    #[test]
    fn test_read_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.r");
        fs::write(&path, "plain 3\n").unwrap();

        assert_eq!(
            read_output_file(&path).unwrap(),
            vec![Entry::new("plain".to_string(), 3)]
        );

        fs::write(&path, "broken\n").unwrap();
        assert!(read_output_file(&path).is_err());
    }
}
