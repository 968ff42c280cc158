//! Constructors and operations expressed once against the common interface.
//!
//! Everything here is a free-function counterpart of (or derivation from)
//! the [Seq] method set; most consumers are written in terms of [Seq::find],
//! the single primitive that walks a sequence with early exit.

use crate::{
    materialized::{self, Materialized},
    Concurrent, Config, Element, Emitter, Error, Seq,
};
use futures::future::BoxFuture;

/// A materialized sequence holding the given elements.
pub fn from<T: Element>(elements: Vec<T>) -> Seq<T> {
    Seq::Materialized(Materialized::new(elements))
}

/// The numbers `0..limit` as a materialized sequence.
pub fn upto_materialized(limit: usize) -> Seq<usize> {
    Seq::Materialized(Materialized::new((0..limit).collect::<Vec<_>>()))
}

/// The numbers `0..limit` as a concurrent sequence.
pub fn upto_concurrent(limit: usize) -> Seq<usize> {
    Seq::Concurrent(Concurrent::upto(limit))
}

/// A concurrent sequence of everything `producer` writes to its emitter.
pub fn generate<T, F, Fut>(producer: F) -> Seq<T>
where
    T: Element,
    F: Fn(Emitter<T>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
{
    Seq::Concurrent(Concurrent::generate(producer))
}

/// The first element for which the predicate holds.
pub async fn find<T: Element>(
    s: &Seq<T>,
    predicate: impl FnMut(&T) -> bool,
) -> Result<Option<T>, Error> {
    s.find(predicate).await
}

pub fn rest<T: Element>(s: &Seq<T>) -> Seq<T> {
    s.rest()
}

pub async fn append<T: Element>(s: &Seq<T>, other: &Seq<T>) -> Result<Seq<T>, Error> {
    s.append(other).await
}

pub async fn prepend<T: Element>(s: &Seq<T>, other: &Seq<T>) -> Result<Seq<T>, Error> {
    s.prepend(other).await
}

pub fn filter<T: Element>(
    s: &Seq<T>,
    predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
) -> Seq<T> {
    s.filter(predicate)
}

pub fn map<T: Element, U: Element>(
    s: &Seq<T>,
    f: impl Fn(T) -> U + Send + Sync + 'static,
) -> Seq<U> {
    s.map(f)
}

pub async fn flat_map<T: Element, U: Element>(
    s: &Seq<T>,
    f: impl Fn(T) -> Seq<U> + Send + Sync + 'static,
) -> Result<Seq<U>, Error> {
    s.flat_map(f).await
}

pub async fn to_materialized<T: Element>(s: &Seq<T>) -> Result<Materialized<T>, Error> {
    s.to_materialized().await
}

pub fn to_concurrent<T: Element>(s: &Seq<T>) -> Concurrent<T> {
    s.to_concurrent()
}

/// The first element, if any.
pub async fn first<T: Element>(s: &Seq<T>) -> Result<Option<T>, Error> {
    s.find(|_| true).await
}

pub async fn is_empty<T: Element>(s: &Seq<T>) -> Result<bool, Error> {
    Ok(first(s).await?.is_none())
}

pub async fn len<T: Element>(s: &Seq<T>) -> Result<usize, Error> {
    s.len().await
}

/// The first `n` elements, in order.
///
/// Errors with [Error::Exhausted] if the sequence runs out early; never
/// reads past the n-th element, so infinite sequences are fine.
pub async fn first_n<T: Element>(s: &Seq<T>, n: usize) -> Result<Vec<T>, Error> {
    let mut taken = Vec::with_capacity(n);
    if n == 0 {
        return Ok(taken);
    }
    s.find(|element| {
        taken.push(element.clone());
        taken.len() == n
    })
    .await?;
    if taken.len() == n {
        Ok(taken)
    } else {
        Err(Error::Exhausted)
    }
}

pub async fn first2<T: Element>(s: &Seq<T>) -> Result<(T, T), Error> {
    match <[T; 2]>::try_from(first_n(s, 2).await?) {
        Ok([a, b]) => Ok((a, b)),
        Err(_) => Err(Error::Exhausted),
    }
}

pub async fn first3<T: Element>(s: &Seq<T>) -> Result<(T, T, T), Error> {
    match <[T; 3]>::try_from(first_n(s, 3).await?) {
        Ok([a, b, c]) => Ok((a, b, c)),
        Err(_) => Err(Error::Exhausted),
    }
}

pub async fn first4<T: Element>(s: &Seq<T>) -> Result<(T, T, T, T), Error> {
    match <[T; 4]>::try_from(first_n(s, 4).await?) {
        Ok([a, b, c, d]) => Ok((a, b, c, d)),
        Err(_) => Err(Error::Exhausted),
    }
}

pub async fn first5<T: Element>(s: &Seq<T>) -> Result<(T, T, T, T, T), Error> {
    match <[T; 5]>::try_from(first_n(s, 5).await?) {
        Ok([a, b, c, d, e]) => Ok((a, b, c, d, e)),
        Err(_) => Err(Error::Exhausted),
    }
}

pub async fn first6<T: Element>(s: &Seq<T>) -> Result<(T, T, T, T, T, T), Error> {
    match <[T; 6]>::try_from(first_n(s, 6).await?) {
        Ok([a, b, c, d, e, f]) => Ok((a, b, c, d, e, f)),
        Err(_) => Err(Error::Exhausted),
    }
}

/// Apply `f` to every element in order.
pub async fn for_each<T: Element>(s: &Seq<T>, mut f: impl FnMut(&T)) -> Result<(), Error> {
    s.find(|element| {
        f(element);
        false
    })
    .await?;
    Ok(())
}

/// Apply `f` to each element in order until it returns false.
pub async fn for_each_while<T: Element>(
    s: &Seq<T>,
    mut f: impl FnMut(&T) -> bool,
) -> Result<(), Error> {
    s.find(|element| !f(element)).await?;
    Ok(())
}

/// Apply `f` to every element with the default concurrency bound, in no
/// particular invocation order; returns once every invocation completes.
pub async fn for_each_concurrent<T: Element>(
    s: &Seq<T>,
    f: impl Fn(T) + Send + Sync + 'static,
) -> Result<(), Error> {
    for_each_concurrent_with(s, Config::default(), f).await
}

/// [for_each_concurrent] with an explicit concurrency bound.
pub async fn for_each_concurrent_with<T: Element>(
    s: &Seq<T>,
    cfg: Config,
    f: impl Fn(T) + Send + Sync + 'static,
) -> Result<(), Error> {
    crate::engine::for_each(s.clone(), cfg, std::sync::Arc::new(f)).await
}

/// Apply `f` to an accumulator and each element in succession.
pub async fn fold<T: Element, A>(
    s: &Seq<T>,
    init: A,
    mut f: impl FnMut(A, T) -> A,
) -> Result<A, Error> {
    match s {
        Seq::Materialized(m) => {
            let mut acc = init;
            for element in m.iter() {
                acc = f(acc, element.clone());
            }
            Ok(acc)
        }
        Seq::Concurrent(c) => {
            let mut drain = c.open();
            let mut acc = init;
            while let Some(item) = drain.next().await {
                acc = f(acc, item?);
            }
            Ok(acc)
        }
    }
}

/// Send every element of `s` to `out`, in order.
pub async fn output<T: Element>(s: &Seq<T>, out: &mut Emitter<T>) -> Result<(), Error> {
    match s {
        Seq::Materialized(m) => {
            for element in m.iter() {
                out.send(element.clone()).await?;
            }
            Ok(())
        }
        Seq::Concurrent(c) => {
            let mut drain = c.open();
            while let Some(item) = drain.next().await {
                out.send(item?).await?;
            }
            Ok(())
        }
    }
}

/// All combinations of the elements of `s` of size `k` or smaller.
///
/// Order within each combination follows source order; the outer order is
/// unspecified. The result carries the realization of the driving sequence.
pub fn combinations<T: Element>(
    s: &Seq<T>,
    k: usize,
) -> BoxFuture<'static, Result<Seq<Seq<T>>, Error>> {
    let s = s.clone();
    Box::pin(async move {
        if k == 0 || is_empty(&s).await? {
            return Ok(singleton_empty::<T, T>(&s));
        }
        let Some(head) = first(&s).await? else {
            return Ok(singleton_empty::<T, T>(&s));
        };
        let rest = s.rest();
        let without = combinations(&rest, k).await?;
        let with = combinations(&rest, k - 1)
            .await?
            .map(move |combo| cons(head.clone(), &combo));
        without.prepend(&with).await
    })
}

/// The n-ary product of a sequence of sequences: every way of picking one
/// element from each factor, in factor order.
///
/// The result carries the realization of the outer sequence; the outer
/// sequence itself is consumed.
pub async fn product<T: Element>(seqs: &Seq<Seq<T>>) -> Result<Seq<Seq<T>>, Error> {
    let mut factors = Vec::new();
    materialized::collect_into(seqs, &mut factors).await?;

    let mut acc = singleton_empty::<T, Seq<T>>(seqs);
    for factor in factors {
        acc = acc
            .flat_map(move |combo| factor.map(move |element| push_back(&combo, element)))
            .await?;
    }
    Ok(acc)
}

/// A sequence containing one empty sequence, carrying the realization of
/// `shape`.
fn singleton_empty<T: Element, S: Element>(shape: &Seq<S>) -> Seq<Seq<T>> {
    let unit: Seq<Seq<T>> = Seq::from(vec![from(Vec::<T>::new())]);
    match shape {
        Seq::Materialized(_) => unit,
        Seq::Concurrent(_) => Seq::Concurrent(unit.to_concurrent()),
    }
}

/// `head` followed by every element of `tail`, in `tail`'s realization.
fn cons<T: Element>(head: T, tail: &Seq<T>) -> Seq<T> {
    match tail {
        Seq::Materialized(m) => {
            let mut items = Vec::with_capacity(m.len() + 1);
            items.push(head);
            items.extend(m.iter().cloned());
            Seq::Materialized(Materialized::new(items))
        }
        Seq::Concurrent(_) => {
            let tail = tail.clone();
            Seq::Concurrent(Concurrent::generate(move |mut out| {
                let head = head.clone();
                let tail = tail.clone();
                async move {
                    out.send(head).await?;
                    output(&tail, &mut out).await
                }
            }))
        }
    }
}

/// Every element of `init` followed by `last`, in `init`'s realization.
fn push_back<T: Element>(init: &Seq<T>, last: T) -> Seq<T> {
    match init {
        Seq::Materialized(m) => {
            let mut items = Vec::with_capacity(m.len() + 1);
            items.extend(m.iter().cloned());
            items.push(last);
            Seq::Materialized(Materialized::new(items))
        }
        Seq::Concurrent(_) => {
            let init = init.clone();
            Seq::Concurrent(Concurrent::generate(move |mut out| {
                let init = init.clone();
                let last = last.clone();
                async move {
                    output(&init, &mut out).await?;
                    out.send(last).await
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn nested_to_vecs<T: Element>(s: &Seq<Seq<T>>) -> Vec<Vec<T>> {
        let outer = s.to_materialized().await.unwrap();
        let mut out = Vec::new();
        for inner in outer.iter() {
            out.push(inner.to_materialized().await.unwrap().to_vec());
        }
        out
    }

    #[tokio::test]
    async fn test_first_and_is_empty() {
        assert_eq!(first(&upto_materialized(3)).await.unwrap(), Some(0));
        assert_eq!(first(&upto_concurrent(3)).await.unwrap(), Some(0));
        assert_eq!(first::<usize>(&from(vec![])).await.unwrap(), None);

        assert!(is_empty::<usize>(&from(vec![])).await.unwrap());
        assert!(is_empty(&upto_concurrent(0)).await.unwrap());
        assert!(!is_empty(&upto_concurrent(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_n() {
        assert_eq!(
            first_n(&upto_materialized(5), 3).await.unwrap(),
            vec![0, 1, 2]
        );
        assert_eq!(first_n(&upto_concurrent(5), 0).await.unwrap(), vec![]);
        assert_eq!(
            first_n(&upto_materialized(2), 3).await.unwrap_err(),
            Error::Exhausted
        );
    }

    #[tokio::test]
    async fn test_first_n_stops_on_infinite() {
        let naturals = generate(|mut out| async move {
            let mut i: usize = 0;
            loop {
                out.send(i).await?;
                i += 1;
            }
        });
        assert_eq!(first_n(&naturals, 4).await.unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_first_tuples() {
        let s = upto_materialized(6);
        assert_eq!(first2(&s).await.unwrap(), (0, 1));
        assert_eq!(first3(&s).await.unwrap(), (0, 1, 2));
        assert_eq!(first6(&s).await.unwrap(), (0, 1, 2, 3, 4, 5));
        assert_eq!(
            first6(&upto_materialized(4)).await.unwrap_err(),
            Error::Exhausted
        );
    }

    #[tokio::test]
    async fn test_for_each_and_while() {
        let mut seen = Vec::new();
        for_each(&upto_concurrent(4), |x| seen.push(*x)).await.unwrap();
        assert_eq!(seen, vec![0, 1, 2, 3]);

        let mut prefix = Vec::new();
        for_each_while(&upto_materialized(10), |x| {
            if *x < 3 {
                prefix.push(*x);
                true
            } else {
                false
            }
        })
        .await
        .unwrap();
        assert_eq!(prefix, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_fold() {
        // Sum of 0..5 over both realizations.
        assert_eq!(
            fold(&upto_materialized(5), 0, |acc, x| acc + x).await.unwrap(),
            10
        );
        assert_eq!(
            fold(&upto_concurrent(5), 0, |acc, x| acc + x).await.unwrap(),
            10
        );
    }

    #[tokio::test]
    async fn test_output() {
        let relayed = generate(|mut out| async move {
            output(&from(vec![1, 2, 3]), &mut out).await
        });
        assert_eq!(
            relayed.to_materialized().await.unwrap().to_vec(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_combinations_of_materialized() {
        let s = from(vec!['a', 'b', 'c']);
        let combos = combinations(&s, 2).await.unwrap();
        assert!(combos.is_materialized());

        let mut found = nested_to_vecs(&combos).await;
        found.sort();
        let mut expected = vec![
            vec![],
            vec!['a'],
            vec!['b'],
            vec!['c'],
            vec!['a', 'b'],
            vec!['a', 'c'],
            vec!['b', 'c'],
        ];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_combinations_of_concurrent() {
        let s = upto_concurrent(3);
        let combos = combinations(&s, 2).await.unwrap();
        assert!(combos.is_concurrent());

        let deep = combos.to_materialized_deep().await.unwrap();
        let mut found = nested_to_vecs(&deep).await;
        found.sort();
        let mut expected = vec![
            vec![],
            vec![0],
            vec![1],
            vec![2],
            vec![0, 1],
            vec![0, 2],
            vec![1, 2],
        ];
        expected.sort();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn test_combinations_zero_size() {
        let combos = combinations(&upto_materialized(3), 0).await.unwrap();
        assert_eq!(nested_to_vecs(&combos).await, vec![Vec::<usize>::new()]);
    }

    #[tokio::test]
    async fn test_flat_map_materialized() {
        let out = from(vec![1, 2, 3])
            .flat_map(|x| from(vec![x, x]))
            .await
            .unwrap();
        assert!(out.is_materialized());
        assert_eq!(
            out.to_materialized().await.unwrap().to_vec(),
            vec![1, 1, 2, 2, 3, 3]
        );
    }

    #[tokio::test]
    async fn test_product_in_order() {
        let factors = from(vec![from(vec![1, 2]), from(vec![10, 20])]);
        let combos = product(&factors).await.unwrap();
        assert!(combos.is_materialized());
        assert_eq!(
            nested_to_vecs(&combos).await,
            vec![vec![1, 10], vec![1, 20], vec![2, 10], vec![2, 20]]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_product_of_concurrent_outer() {
        let factors: Seq<Seq<usize>> =
            Seq::from(from(vec![upto_concurrent(2), from(vec![10, 20])]).to_concurrent());
        let combos = product(&factors).await.unwrap();
        assert!(combos.is_concurrent());

        let deep = combos.to_materialized_deep().await.unwrap();
        assert_eq!(
            nested_to_vecs(&deep).await,
            vec![vec![0, 10], vec![0, 20], vec![1, 10], vec![1, 20]]
        );
    }

    #[tokio::test]
    async fn test_product_of_no_factors() {
        let factors: Seq<Seq<usize>> = from(vec![]);
        let combos = product(&factors).await.unwrap();
        assert_eq!(nested_to_vecs(&combos).await, vec![Vec::<usize>::new()]);
    }
}
