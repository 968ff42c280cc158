//! The lazy, producer-driven sequence realization.
//!
//! A [Concurrent] value is a recipe, not a traversal: each call to
//! [Concurrent::open] allocates a fresh rendezvous channel, spawns the
//! producer as a background task, and returns the consuming endpoint. One
//! consumer per invocation; re-opening starts the traversal from scratch.
//!
//! Teardown is driven entirely by channel closure. Dropping a [Drain] before
//! end-of-stream makes the producer's next send fail with [Error::Closed],
//! which producers propagate with `?` to unwind. Nothing else is shared
//! across tasks.

use crate::{ops, Element, Error, Seq};
use futures::{channel::mpsc, future::BoxFuture, Future, SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// An element in flight: producers emit `Ok` values and a failed pipeline
/// injects a single `Err` immediately before closing.
pub type Item<T> = Result<T, Error>;

type Producer<T> = dyn Fn(Emitter<T>) -> BoxFuture<'static, Result<(), Error>> + Send + Sync;

/// A lazy sequence realized by a producer task writing to a channel.
pub struct Concurrent<T: Element> {
    producer: Arc<Producer<T>>,
}

impl<T: Element> Clone for Concurrent<T> {
    fn clone(&self) -> Self {
        Self {
            producer: self.producer.clone(),
        }
    }
}

impl<T: Element> Concurrent<T> {
    /// Wrap a producer function.
    ///
    /// The producer receives the sending endpoint of a fresh channel on each
    /// [Self::open]. It must treat [Error::Closed] from a send as an
    /// instruction to return promptly; `?` does the right thing.
    pub fn generate<F, Fut>(producer: F) -> Self
    where
        F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Error>> + Send + 'static,
    {
        Self {
            producer: Arc::new(move |emitter| -> BoxFuture<'static, Result<(), Error>> {
                Box::pin(producer(emitter))
            }),
        }
    }

    /// Start a fresh traversal.
    ///
    /// Spawns the producer task and returns the single consumer endpoint.
    /// Requires an ambient tokio runtime.
    pub fn open(&self) -> Drain<T> {
        let (sender, receiver) = mpsc::channel(0);
        let producer = self.producer.clone();
        tokio::spawn(async move {
            let mut failure = sender.clone();
            match producer(Emitter { sender }).await {
                Ok(()) => trace!("producer finished"),
                Err(Error::Closed) => trace!("consumer hung up; producer unwound"),
                Err(err) => {
                    debug!(%err, "producer failed");
                    let _ = failure.send(Err(err)).await;
                }
            }
        });
        Drain { receiver }
    }

    /// A sequence that opens `upstream` and discards its first element.
    pub(crate) fn skip_first(upstream: Concurrent<T>) -> Self {
        Self::generate(move |mut out| {
            let upstream = upstream.clone();
            async move {
                let mut drain = upstream.open();
                if drain.next().await.transpose()?.is_none() {
                    return Ok(());
                }
                while let Some(item) = drain.next().await {
                    out.send(item?).await?;
                }
                Ok(())
            }
        })
    }

    /// A sequence producing every element of `first`, then every element of
    /// `second`.
    pub(crate) fn chain(first: Seq<T>, second: Seq<T>) -> Self {
        Self::generate(move |mut out| {
            let first = first.clone();
            let second = second.clone();
            async move {
                ops::output(&first, &mut out).await?;
                ops::output(&second, &mut out).await
            }
        })
    }
}

impl Concurrent<usize> {
    /// The numbers `0..limit`, produced in succession.
    pub(crate) fn upto(limit: usize) -> Self {
        Self::generate(move |mut out| async move {
            for i in 0..limit {
                out.send(i).await?;
            }
            Ok(())
        })
    }
}

/// Producer-side endpoint of one open traversal.
pub struct Emitter<T: Element> {
    sender: mpsc::Sender<Item<T>>,
}

impl<T: Element> Emitter<T> {
    /// Send the next element, parking until the consumer takes delivery.
    ///
    /// Errors with [Error::Closed] once the consumer has hung up; that is
    /// the teardown instruction and producers propagate it.
    pub async fn send(&mut self, element: T) -> Result<(), Error> {
        self.sender.send(Ok(element)).await.map_err(|_| Error::Closed)
    }

    pub(crate) async fn forward(&mut self, item: Item<T>) -> Result<(), Error> {
        self.sender.send(item).await.map_err(|_| Error::Closed)
    }
}

/// Consumer-side endpoint of one open traversal.
///
/// Dropping the drain before end-of-stream tears down the producer chain:
/// every upstream send fails from that point on.
pub struct Drain<T: Element> {
    receiver: mpsc::Receiver<Item<T>>,
}

impl<T: Element> Drain<T> {
    /// The next element, or `None` at end-of-stream.
    pub async fn next(&mut self) -> Option<Item<T>> {
        self.receiver.next().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    async fn drain_all<T: Element>(c: &Concurrent<T>) -> Vec<T> {
        let mut drain = c.open();
        let mut out = Vec::new();
        while let Some(item) = drain.next().await {
            out.push(item.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_generate_in_order() {
        let s = Concurrent::generate(|mut out| async move {
            for word in ["a", "b", "c"] {
                out.send(word).await?;
            }
            Ok(())
        });
        assert_eq!(drain_all(&s).await, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_reopen_restarts() {
        let s = Concurrent::upto(4);
        assert_eq!(drain_all(&s).await, vec![0, 1, 2, 3]);
        assert_eq!(drain_all(&s).await, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_skip_first() {
        let s = Concurrent::skip_first(Concurrent::upto(4));
        assert_eq!(drain_all(&s).await, vec![1, 2, 3]);

        let empty = Concurrent::skip_first(Concurrent::upto(0));
        assert!(drain_all(&empty).await.is_empty());
    }

    #[tokio::test]
    async fn test_chain() {
        let s = Concurrent::chain(ops::upto_concurrent(2), ops::from(vec![7, 8]));
        assert_eq!(drain_all(&s).await, vec![0, 1, 7, 8]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandonment_unwinds_producer() {
        let unwound = Arc::new(AtomicBool::new(false));
        let flag = unwound.clone();
        let s: Concurrent<usize> = Concurrent::generate(move |mut out| {
            let flag = flag.clone();
            async move {
                let mut i = 0;
                let err = loop {
                    if let Err(err) = out.send(i).await {
                        break err;
                    }
                    i += 1;
                };
                flag.store(true, Ordering::SeqCst);
                Err(err)
            }
        });

        // Read a few elements of the infinite stream, then hang up.
        {
            let mut drain = s.open();
            for expected in 0..3 {
                assert_eq!(drain.next().await.unwrap().unwrap(), expected);
            }
        }

        // The producer must observe the closure within bounded time.
        for _ in 0..100 {
            if unwound.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("producer still running after consumer hung up");
    }

    #[tokio::test]
    async fn test_producer_failure_is_delivered() {
        let s: Concurrent<usize> = Concurrent::generate(|mut out| async move {
            out.send(1).await?;
            Err(Error::Task("synthetic".into()))
        });
        let mut drain = s.open();
        assert_eq!(drain.next().await.unwrap().unwrap(), 1);
        assert_eq!(
            drain.next().await.unwrap().unwrap_err(),
            Error::Task("synthetic".into())
        );
        assert!(drain.next().await.is_none());
    }
}
