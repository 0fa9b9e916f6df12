//! Internal implementation of the partition queue.

use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use log;
use tokio::sync::mpsc;

use crate::entry::Tuple;
use crate::error::{Result, WordCountError};

type Sender = mpsc::UnboundedSender<Tuple>;
type Receiver = mpsc::UnboundedReceiver<Tuple>;

/// Producer handle of one partition. Cloning is cheap and every clone feeds the
/// same `QueueStream`.
///
/// Mappers never hold a raw sender: the only one lives here, so `finish` is
/// enough to close the stream no matter how many producers are still around.
#[derive(Clone)]
pub struct PartitionedQueue {
    inner: Arc<Inner>,
}

struct Inner {
    partition: usize,
    sender: RwLock<Option<Sender>>,
}

/// Consumer side of a partition queue.
///
/// Yields every tuple sent before `PartitionedQueue::finish` and then ends.
pub struct QueueStream {
    partition: usize,
    receiver: Receiver,
}

impl PartitionedQueue {
    pub fn channel(partition: usize) -> (PartitionedQueue, QueueStream) {
        let (tx, rx) = mpsc::unbounded_channel();

        let queue = PartitionedQueue {
            inner: Arc::new(Inner {
                partition,
                sender: RwLock::new(Some(tx)),
            }),
        };

        let stream = QueueStream {
            partition,
            receiver: rx,
        };

        (queue, stream)
    }

    #[inline]
    pub fn partition(&self) -> usize {
        self.inner.partition
    }

    /// Enqueue a tuple. Never blocks.
    pub fn send(&self, tuple: Tuple) -> Result<()> {
        let guard = self
            .inner
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        match guard.as_ref() {
            Some(tx) => tx.send(tuple).map_err(|_| {
                WordCountError::protocol(format!(
                    "consumer of partition {} is gone",
                    self.inner.partition
                ))
            }),
            None => Err(WordCountError::protocol(format!(
                "partition {} is already finished",
                self.inner.partition
            ))),
        }
    }

    /// Close the stream. Tuples already sent are still delivered.
    pub fn finish(&self) {
        let mut guard = self
            .inner
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if guard.take().is_some() {
            log::debug!("Finished queue of partition {}", self.inner.partition);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl QueueStream {
    #[inline]
    pub fn partition(&self) -> usize {
        self.partition
    }
}

impl Stream for QueueStream {
    type Item = Tuple;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Tuple>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
