//! The eager, random-access sequence realization.

use crate::{Element, Error, Seq};
use std::{fmt, sync::Arc};

/// An ordered, finite, random-access sequence.
///
/// Elements live in a shared buffer, so cloning is cheap and [Self::rest] is
/// an O(1) view onto the tail rather than a copy.
pub struct Materialized<T: Element> {
    items: Arc<[T]>,
    start: usize,
}

impl<T: Element> Clone for Materialized<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            start: self.start,
        }
    }
}

impl<T: Element> Materialized<T> {
    /// Create a sequence holding the given elements.
    pub fn new(items: impl Into<Arc<[T]>>) -> Self {
        Self {
            items: items.into(),
            start: 0,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len() - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[self.start..]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.as_slice().iter()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// The first element matching the predicate, scanning in order.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<T> {
        for element in self.iter() {
            if predicate(element) {
                return Some(element.clone());
            }
        }
        None
    }

    /// A view omitting the first element. The rest of an empty sequence is
    /// empty.
    pub fn rest(&self) -> Self {
        Self {
            items: self.items.clone(),
            start: (self.start + 1).min(self.items.len()),
        }
    }

    pub(crate) fn map_eager<U: Element>(&self, f: impl Fn(T) -> U) -> Materialized<U> {
        let mut mapped = Vec::with_capacity(self.len());
        for element in self.iter() {
            mapped.push(f(element.clone()));
        }
        Materialized::new(mapped)
    }

    pub(crate) fn filter_eager(&self, predicate: impl Fn(&T) -> bool) -> Self {
        let mut kept = Vec::with_capacity(self.len());
        for element in self.iter() {
            if predicate(element) {
                kept.push(element.clone());
            }
        }
        Self::new(kept)
    }
}

impl<T: Element + PartialEq> PartialEq for Materialized<T> {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl<T: Element + Eq> Eq for Materialized<T> {}

impl<T: Element + fmt::Debug> fmt::Debug for Materialized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T: Element> From<Vec<T>> for Materialized<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

/// Length when it is known without consuming the sequence, else `default`.
pub(crate) fn quick_len<T: Element>(s: &Seq<T>, default: usize) -> usize {
    match s {
        Seq::Materialized(m) => m.len(),
        Seq::Concurrent(_) => default,
    }
}

/// Drain every element of `s` into `out`, consuming a concurrent receiver.
pub(crate) async fn collect_into<T: Element>(s: &Seq<T>, out: &mut Vec<T>) -> Result<(), Error> {
    match s {
        Seq::Materialized(m) => {
            out.extend(m.iter().cloned());
            Ok(())
        }
        Seq::Concurrent(c) => {
            let mut drain = c.open();
            while let Some(item) = drain.next().await {
                out.push(item?);
            }
            Ok(())
        }
    }
}

/// Eagerly concatenate two sequences of any realization into one buffer.
pub(crate) async fn append<T: Element>(
    first: &Seq<T>,
    second: &Seq<T>,
) -> Result<Materialized<T>, Error> {
    let mut items = Vec::with_capacity(quick_len(first, 8) + quick_len(second, 8));
    collect_into(first, &mut items).await?;
    collect_into(second, &mut items).await?;
    Ok(Materialized::new(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops;

    #[test]
    fn test_len_and_get() {
        let s = Materialized::new(vec![1, 2, 3]);
        assert_eq!(s.len(), 3);
        assert!(!s.is_empty());
        assert_eq!(s.get(0), Some(&1));
        assert_eq!(s.get(2), Some(&3));
        assert_eq!(s.get(3), None);
    }

    #[test]
    fn test_find() {
        let s = Materialized::new(vec![1, 2, 3, 4]);
        assert_eq!(s.find(|x| x % 2 == 0), Some(2));
        assert_eq!(s.find(|x| *x > 4), None);
    }

    #[test]
    fn test_rest_is_view() {
        let s = Materialized::new(vec![1, 2, 3]);
        let rest = s.rest();
        assert_eq!(rest.to_vec(), vec![2, 3]);
        // The original is untouched and both share the same buffer.
        assert_eq!(s.to_vec(), vec![1, 2, 3]);
        assert_eq!(rest.rest().rest().len(), 0);
        assert_eq!(rest.rest().rest().rest().len(), 0);
    }

    #[test]
    fn test_map_filter_eager() {
        let s = Materialized::new(vec![0, 1, 2, 3]);
        assert_eq!(s.map_eager(|x| x + 1).to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(s.filter_eager(|x| x % 2 == 0).to_vec(), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_append_materialized() {
        let a = ops::from(vec![1, 2]);
        let b = ops::from(vec![3]);
        let joined = append(&a, &b).await.unwrap();
        assert_eq!(joined.to_vec(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_append_drains_concurrent_argument() {
        let a = ops::from(vec![0, 1]);
        let b = ops::upto_concurrent(3);
        let joined = append(&a, &b).await.unwrap();
        assert_eq!(joined.to_vec(), vec![0, 1, 0, 1, 2]);
    }
}
