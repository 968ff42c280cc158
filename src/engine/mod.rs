//! The order-preserving, bounded-parallelism mapping engine.
//!
//! One coordinator task per pipeline owns the upstream drain, a private
//! reply channel fed by worker tasks, the downstream emitter, and a
//! [SlidingWindow] of completed results indexed by absolute input position.
//! The coordinator multiplexes three edges in a biased select:
//!
//! - **emit**: when the window's front slot is populated, deliver it
//!   downstream and pop it;
//! - **ingest**: when the upstream is live and a window slot is reserved,
//!   read the next element and spawn a worker bound to its input index;
//! - **collect**: when workers are outstanding, read a reply and place the
//!   result at its absolute index in the window.
//!
//! Workers complete in any order, but emission draws only from the window's
//! base slot, so the output order equals the input order. Ingest is capped
//! by the number of results admitted but not yet emitted, which keeps every
//! live index addressable by the window and the whole pipeline within O(N)
//! memory for a bound of N.
//!
//! Teardown needs no control channel: the consumer hanging up fails the next
//! emit, after which the coordinator returns, dropping the upstream drain
//! (unwinding the producer chain) and the reply endpoints (unblocking any
//! straggler workers).

mod window;
use window::SlidingWindow;

use crate::{
    concurrent::{Drain, Emitter, Item},
    select, Concurrent, Element, Error, Seq,
};
use futures::{
    channel::mpsc,
    future::{self, Either},
    SinkExt, StreamExt,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{debug, trace};

/// Concurrency configuration for engine-backed operations.
///
/// The bound is always a power of two: at most `1 << power` invocations of
/// the user function are in flight at any instant. `power = 0` degenerates
/// to strict one-at-a-time ordered mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    pub power: u32,
}

impl Config {
    pub const DEFAULT_POWER: u32 = 6;

    pub fn new(power: u32) -> Self {
        Self { power }
    }

    /// The maximum number of in-flight user-function invocations.
    pub fn bound(&self) -> usize {
        1 << self.power
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::DEFAULT_POWER)
    }
}

pub(crate) type MapFn<T, U> = Arc<dyn Fn(T) -> U + Send + Sync>;
pub(crate) type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
pub(crate) type EffectFn<T> = Arc<dyn Fn(T) + Send + Sync>;

/// A completed user-function invocation, addressed by input position.
struct Reply<U> {
    index: usize,
    result: Result<U, Error>,
}

/// The concurrent map: the i-th output element is `f` of the i-th input
/// element, computed up to `cfg.bound()` at a time.
pub(crate) fn map<T: Element, U: Element>(
    source: Seq<T>,
    cfg: Config,
    f: MapFn<T, U>,
) -> Concurrent<U> {
    Concurrent::generate(move |output| {
        let source = source.clone();
        let f = f.clone();
        async move {
            let input = source.to_concurrent().open();
            Engine {
                cfg,
                input,
                output,
                f,
            }
            .run()
            .await
        }
    })
}

/// The concurrent filter: predicates are evaluated in workers under the
/// bound, and an emit-time guard drops non-matching elements, so order is
/// preserved without a reordering pass.
pub(crate) fn filter<T: Element>(
    source: Seq<T>,
    cfg: Config,
    predicate: FilterFn<T>,
) -> Concurrent<T> {
    let verdicts = map(
        source,
        cfg,
        Arc::new(move |element: T| {
            let keep = predicate(&element);
            (element, keep)
        }),
    );
    Concurrent::generate(move |mut output| {
        let verdicts = verdicts.clone();
        async move {
            let mut drain = verdicts.open();
            while let Some(item) = drain.next().await {
                let (element, keep) = item?;
                if keep {
                    output.send(element).await?;
                }
            }
            Ok(())
        }
    })
}

/// The concurrent flat-map: map each element to a sub-sequence, then forward
/// each sub-sequence's elements downstream in order.
pub(crate) fn flat_map<T: Element, U: Element>(
    source: Seq<T>,
    cfg: Config,
    f: MapFn<T, Seq<U>>,
) -> Concurrent<U> {
    let subs = map(source, cfg, f);
    Concurrent::generate(move |mut output| {
        let subs = subs.clone();
        async move {
            let mut drain = subs.open();
            while let Some(item) = drain.next().await {
                crate::ops::output(&item?, &mut output).await?;
            }
            Ok(())
        }
    })
}

/// Apply `f` to every element with bounded parallelism, returning once every
/// invocation has completed.
pub(crate) async fn for_each<T: Element>(
    source: Seq<T>,
    cfg: Config,
    f: EffectFn<T>,
) -> Result<(), Error> {
    let effects = map(source, cfg, Arc::new(move |element| f(element)));
    let mut drain = effects.open();
    while let Some(item) = drain.next().await {
        item?;
    }
    Ok(())
}

struct Engine<T: Element, U: Element> {
    cfg: Config,
    input: Drain<T>,
    output: Emitter<U>,
    f: MapFn<T, U>,
}

impl<T: Element, U: Element> Engine<T, U> {
    async fn run(self) -> Result<(), Error> {
        let Engine {
            cfg,
            mut input,
            mut output,
            f,
        } = self;
        let bound = cfg.bound();
        let mut window: SlidingWindow<Item<U>> = SlidingWindow::new(cfg.power);
        let (reply_sender, mut replies) = mpsc::channel::<Reply<U>>(0);

        // Absolute index of the next upstream element.
        let mut next_index: usize = 0;
        // Workers spawned but not yet collected.
        let mut pending: usize = 0;
        // Results admitted to the pipeline but not yet emitted. Capping
        // ingest on this keeps every live index inside
        // [window.base(), window.base() + bound), so placement never misses.
        let mut in_flight: usize = 0;
        let mut input_closed = false;

        while !input_closed || pending > 0 || !window.is_empty() {
            debug_assert_eq!(pending + window.count(), in_flight);
            debug_assert_eq!(next_index - window.base(), in_flight);

            let emit = match window.first() {
                Some(item) => Either::Left(output.forward(item.clone())),
                None => Either::Right(future::pending()),
            };
            let ingest = if !input_closed && in_flight < bound {
                Either::Left(input.next())
            } else {
                Either::Right(future::pending())
            };
            let collect = if pending > 0 && !window.is_full() {
                Either::Left(replies.next())
            } else {
                Either::Right(future::pending())
            };

            select! {
                delivered = emit => {
                    if delivered.is_err() {
                        trace!("downstream closed; tearing down");
                        return Err(Error::Closed);
                    }
                    let emitted = window.remove_first();
                    in_flight -= 1;
                    if matches!(emitted, Some(Err(_))) {
                        debug!("failure delivered; aborting pipeline");
                        return Ok(());
                    }
                },
                element = ingest => {
                    match element {
                        Some(Ok(value)) => {
                            let index = next_index;
                            next_index += 1;
                            pending += 1;
                            in_flight += 1;
                            let f = f.clone();
                            let mut reply = reply_sender.clone();
                            tokio::spawn(async move {
                                let result = invoke(&f, value);
                                if reply.send(Reply { index, result }).await.is_err() {
                                    trace!(index, "reply channel closed before delivery");
                                }
                            });
                        }
                        Some(Err(err)) => {
                            // An upstream failure occupies its input slot so
                            // it is delivered at the right position.
                            assert!(
                                window.set(next_index, Err(err)),
                                "failure index outside window"
                            );
                            next_index += 1;
                            in_flight += 1;
                            input_closed = true;
                        }
                        None => input_closed = true,
                    }
                },
                reply = collect => {
                    if let Some(Reply { index, result }) = reply {
                        pending -= 1;
                        if result.is_err() {
                            debug!(index, "worker failed; halting ingest");
                            input_closed = true;
                        }
                        assert!(window.set(index, result), "reply index outside window");
                    }
                },
            }
        }
        trace!(total = next_index, "pipeline drained");
        Ok(())
    }
}

/// Run the user function, converting a panic into a positioned failure.
fn invoke<T, U>(f: &MapFn<T, U>, value: T) -> Result<U, Error> {
    panic::catch_unwind(AssertUnwindSafe(|| f(value)))
        .map_err(|payload| Error::Task(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "user function panicked".to_string()
    }
}
