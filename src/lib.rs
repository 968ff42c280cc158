//! Lazy, composable sequences with order-preserving bounded parallelism.
//!
//! This crate provides one algebra of sequence operations over two
//! interchangeable realizations: a [Materialized] sequence (eager, finite,
//! random-access) and a [Concurrent] sequence (lazy, producer-driven,
//! single consumer per traversal). The [Seq] enum is the common interface;
//! operations combine the realizations freely and preserve the receiver's
//! realization in their result.
//!
//! Concurrent `map`, `filter`, `flat_map`, and `for_each` are driven by an
//! ordered mapping engine: a coordinator task applies the user function to
//! every element in parallel, up to a configured power-of-two bound
//! ([Config], default 64), and emits results in strict input order from a
//! sliding window of completed slots. Abandoning a traversal early (for
//! example, a satisfied [Seq::find]) tears down the producer chain and all
//! outstanding workers through channel closure alone.
//!
//! Consuming a concurrent sequence requires an ambient [tokio] runtime;
//! materialized operations never touch it.
//!
//! ```
//! use ordseq::{ops, Config};
//!
//! let runtime = tokio::runtime::Builder::new_multi_thread()
//!     .worker_threads(2)
//!     .build()
//!     .unwrap();
//! runtime.block_on(async {
//!     // Square the naturals with up to four invocations in flight; results
//!     // arrive in input order regardless of completion order.
//!     let squares = ops::upto_concurrent(8).map_with(Config::new(2), |x| x * x);
//!     let collected = squares.to_materialized().await.unwrap();
//!     assert_eq!(collected.to_vec(), vec![0, 1, 4, 9, 16, 25, 36, 49]);
//! });
//! ```

use futures::future::BoxFuture;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Macro to select the first future that completes (biased by order).
///
/// It is not possible to use duplicate variable names with the macro.
#[macro_export]
macro_rules! select {
    (
        $(
            $var:ident = $fut:expr => $block:block
        ),+ $(,)?
    ) => {{
        use futures::{pin_mut, select_biased, FutureExt};
        $(
            // Fuse each future and assign it to the provided variable
            let $var = $fut.fuse();
            pin_mut!($var);
        )+

        // Use `futures::select_biased!` to await the first future that completes
        select_biased! {
            $(
                $var = $var => $block,
            )+
        }
    }};
}

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The consumer hung up; producers treat this as a teardown instruction.
    #[error("closed")]
    Closed,
    /// The sequence held fewer elements than the caller asked for.
    #[error("exhausted")]
    Exhausted,
    /// A user function panicked inside a worker.
    #[error("task failed: {0}")]
    Task(String),
}

/// Anything a sequence can carry.
pub trait Element: Clone + Send + Sync + 'static {}
impl<T: Clone + Send + Sync + 'static> Element for T {}

pub mod concurrent;
mod engine;
pub mod materialized;
pub mod ops;

pub use concurrent::{Concurrent, Drain, Emitter, Item};
pub use engine::Config;
pub use materialized::Materialized;

/// A finite or countably-infinite ordered collection of elements, in one of
/// two realizations.
///
/// Values are immutable once constructed; every operation derives a new
/// value. Operations preserve the realization of their receiver: deriving
/// from a materialized sequence is eager, deriving from a concurrent one
/// builds a lazy pipeline that runs when the result is consumed.
pub enum Seq<T: Element> {
    Materialized(Materialized<T>),
    Concurrent(Concurrent<T>),
}

impl<T: Element> Clone for Seq<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Materialized(m) => Self::Materialized(m.clone()),
            Self::Concurrent(c) => Self::Concurrent(c.clone()),
        }
    }
}

impl<T: Element> Seq<T> {
    /// The first element for which the predicate holds, scanning in order.
    ///
    /// On a concurrent receiver this opens a traversal and hangs up as soon
    /// as a match is found, unwinding the producer chain.
    pub async fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Result<Option<T>, Error> {
        match self {
            Self::Materialized(m) => Ok(m.find(predicate)),
            Self::Concurrent(c) => {
                let mut drain = c.open();
                while let Some(item) = drain.next().await {
                    let element = item?;
                    if predicate(&element) {
                        return Ok(Some(element));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Everything but the first element.
    ///
    /// A view for a materialized receiver; for a concurrent receiver, a
    /// sequence whose traversal starts the upstream anew and discards one
    /// element. The rest of an empty sequence is empty.
    pub fn rest(&self) -> Self {
        match self {
            Self::Materialized(m) => Self::Materialized(m.rest()),
            Self::Concurrent(c) => Self::Concurrent(Concurrent::skip_first(c.clone())),
        }
    }

    /// Total number of elements. Consumes a concurrent receiver's traversal.
    pub async fn len(&self) -> Result<usize, Error> {
        match self {
            Self::Materialized(m) => Ok(m.len()),
            Self::Concurrent(c) => {
                let mut drain = c.open();
                let mut total = 0;
                while let Some(item) = drain.next().await {
                    item?;
                    total += 1;
                }
                Ok(total)
            }
        }
    }

    /// Concatenate, producing a sequence with the receiver's realization.
    ///
    /// A materialized receiver drains `other` into a new buffer, which is
    /// why this is async; a concurrent receiver concatenates lazily.
    pub async fn append(&self, other: &Seq<T>) -> Result<Seq<T>, Error> {
        match self {
            Self::Materialized(_) => Ok(Self::Materialized(
                materialized::append(self, other).await?,
            )),
            Self::Concurrent(_) => Ok(Self::Concurrent(Concurrent::chain(
                self.clone(),
                other.clone(),
            ))),
        }
    }

    /// Concatenate with `other` first, preserving the receiver's
    /// realization.
    pub async fn prepend(&self, other: &Seq<T>) -> Result<Seq<T>, Error> {
        match self {
            Self::Materialized(_) => Ok(Self::Materialized(
                materialized::append(other, self).await?,
            )),
            Self::Concurrent(_) => Ok(Self::Concurrent(Concurrent::chain(
                other.clone(),
                self.clone(),
            ))),
        }
    }

    /// Keep the elements for which the predicate holds.
    pub fn filter(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Seq<T> {
        self.filter_with(Config::default(), predicate)
    }

    /// [Self::filter] with an explicit concurrency bound for a concurrent
    /// receiver (the bound is irrelevant to a materialized one).
    pub fn filter_with(
        &self,
        cfg: Config,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Seq<T> {
        match self {
            Self::Materialized(m) => Self::Materialized(m.filter_eager(predicate)),
            Self::Concurrent(_) => {
                Self::Concurrent(engine::filter(self.clone(), cfg, Arc::new(predicate)))
            }
        }
    }

    /// Apply `f` to every element.
    pub fn map<U: Element>(&self, f: impl Fn(T) -> U + Send + Sync + 'static) -> Seq<U> {
        self.map_with(Config::default(), f)
    }

    /// [Self::map] with an explicit concurrency bound for a concurrent
    /// receiver.
    pub fn map_with<U: Element>(
        &self,
        cfg: Config,
        f: impl Fn(T) -> U + Send + Sync + 'static,
    ) -> Seq<U> {
        match self {
            Self::Materialized(m) => Seq::Materialized(m.map_eager(f)),
            Self::Concurrent(_) => Seq::Concurrent(engine::map(self.clone(), cfg, Arc::new(f))),
        }
    }

    /// Concatenate the sequences `f` returns for every element.
    ///
    /// Async because a materialized receiver drains each sub-sequence
    /// eagerly, and `f` may hand back concurrent ones.
    pub async fn flat_map<U: Element>(
        &self,
        f: impl Fn(T) -> Seq<U> + Send + Sync + 'static,
    ) -> Result<Seq<U>, Error> {
        self.flat_map_with(Config::default(), f).await
    }

    /// [Self::flat_map] with an explicit concurrency bound for a concurrent
    /// receiver.
    pub async fn flat_map_with<U: Element>(
        &self,
        cfg: Config,
        f: impl Fn(T) -> Seq<U> + Send + Sync + 'static,
    ) -> Result<Seq<U>, Error> {
        match self {
            Self::Materialized(m) => {
                let mut items = Vec::with_capacity(m.len());
                for element in m.iter() {
                    let sub = f(element.clone());
                    materialized::collect_into(&sub, &mut items).await?;
                }
                Ok(Seq::Materialized(Materialized::new(items)))
            }
            Self::Concurrent(_) => Ok(Seq::Concurrent(engine::flat_map(
                self.clone(),
                cfg,
                Arc::new(f),
            ))),
        }
    }

    /// Convert to the materialized realization, consuming a concurrent
    /// receiver. Identity (a cheap clone) for a materialized one.
    pub async fn to_materialized(&self) -> Result<Materialized<T>, Error> {
        match self {
            Self::Materialized(m) => Ok(m.clone()),
            Self::Concurrent(_) => {
                let mut items = Vec::new();
                materialized::collect_into(self, &mut items).await?;
                Ok(Materialized::new(items))
            }
        }
    }

    /// Convert to the concurrent realization. Identity for a concurrent
    /// receiver; otherwise a producer that outputs the snapshot.
    pub fn to_concurrent(&self) -> Concurrent<T> {
        match self {
            Self::Concurrent(c) => c.clone(),
            Self::Materialized(_) => {
                let source = self.clone();
                Concurrent::generate(move |mut out| {
                    let source = source.clone();
                    async move { ops::output(&source, &mut out).await }
                })
            }
        }
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized(_))
    }

    pub fn is_concurrent(&self) -> bool {
        matches!(self, Self::Concurrent(_))
    }

    // The derived operations below delegate to their free-function forms in
    // [ops]; both spellings are part of the interface.

    pub async fn first(&self) -> Result<Option<T>, Error> {
        ops::first(self).await
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        ops::is_empty(self).await
    }

    pub async fn first_n(&self, n: usize) -> Result<Vec<T>, Error> {
        ops::first_n(self, n).await
    }

    pub async fn first2(&self) -> Result<(T, T), Error> {
        ops::first2(self).await
    }

    pub async fn first3(&self) -> Result<(T, T, T), Error> {
        ops::first3(self).await
    }

    pub async fn first4(&self) -> Result<(T, T, T, T), Error> {
        ops::first4(self).await
    }

    pub async fn first5(&self) -> Result<(T, T, T, T, T), Error> {
        ops::first5(self).await
    }

    pub async fn first6(&self) -> Result<(T, T, T, T, T, T), Error> {
        ops::first6(self).await
    }

    pub async fn for_each(&self, f: impl FnMut(&T)) -> Result<(), Error> {
        ops::for_each(self, f).await
    }

    pub async fn for_each_while(&self, f: impl FnMut(&T) -> bool) -> Result<(), Error> {
        ops::for_each_while(self, f).await
    }

    pub async fn for_each_concurrent(
        &self,
        f: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        ops::for_each_concurrent(self, f).await
    }

    pub async fn for_each_concurrent_with(
        &self,
        cfg: Config,
        f: impl Fn(T) + Send + Sync + 'static,
    ) -> Result<(), Error> {
        ops::for_each_concurrent_with(self, cfg, f).await
    }

    pub async fn fold<A>(&self, init: A, f: impl FnMut(A, T) -> A) -> Result<A, Error> {
        ops::fold(self, init, f).await
    }

    pub fn combinations(&self, k: usize) -> BoxFuture<'static, Result<Seq<Seq<T>>, Error>> {
        ops::combinations(self, k)
    }
}

impl<T: Element> Seq<Seq<T>> {
    /// The n-ary product of this sequence of sequences.
    pub async fn product(&self) -> Result<Seq<Seq<T>>, Error> {
        ops::product(self).await
    }

    /// Recursively materialize a sequence of sequences: the outer sequence
    /// and every element are converted. Already-materialized elements pass
    /// through as cheap clones.
    pub async fn to_materialized_deep(&self) -> Result<Seq<Seq<T>>, Error> {
        let outer = self.to_materialized().await?;
        let mut inners = Vec::with_capacity(outer.len());
        for inner in outer.iter() {
            inners.push(Seq::Materialized(inner.to_materialized().await?));
        }
        Ok(Seq::Materialized(Materialized::new(inners)))
    }
}

impl<T: Element> From<Materialized<T>> for Seq<T> {
    fn from(m: Materialized<T>) -> Self {
        Self::Materialized(m)
    }
}

impl<T: Element> From<Concurrent<T>> for Seq<T> {
    fn from(c: Concurrent<T>) -> Self {
        Self::Concurrent(c)
    }
}

impl<T: Element> From<Vec<T>> for Seq<T> {
    fn from(items: Vec<T>) -> Self {
        Self::Materialized(Materialized::new(items))
    }
}
