//! Weight ordering against the host's native sort polarity.
//!
//! Some hosts sort ascending by default, others descending. The direction is
//! probed once with a fixed sequence and then used to flip the sort keys, so
//! the visible order always ends up ascending by weight.

use std::cmp::Reverse;

/// Fixed sequence used to detect the host's sort polarity.
pub const PROBE: [i64; 4] = [1, 4, 2, 3];

/// The host's native ordering routine.
pub trait HostOrdering: Send {
    /// Index permutation the host produces when sorting `keys`.
    fn permutation(&self, keys: &[i64]) -> Vec<usize>;
}

/// Host whose native sort is ascending and stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAscending;

impl HostOrdering for NativeAscending {
    fn permutation(&self, keys: &[i64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&i| keys[i]);
        order
    }
}

/// Host whose native sort is descending and stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeDescending;

impl HostOrdering for NativeDescending {
    fn permutation(&self, keys: &[i64]) -> Vec<usize> {
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&i| Reverse(keys[i]));
        order
    }
}

/// Detected host sort polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Sort [`PROBE`] with the host and inspect the first two results.
    pub fn probe(host: &dyn HostOrdering) -> Self {
        let order = host.permutation(&PROBE);
        let sorted: Vec<i64> = order.iter().filter_map(|&i| PROBE.get(i).copied()).collect();
        match sorted.as_slice() {
            [first, second, ..] if first > second => SortDirection::Descending,
            _ => SortDirection::Ascending,
        }
    }

    pub fn key(self, weight: i64) -> i64 {
        match self {
            SortDirection::Ascending => weight,
            SortDirection::Descending => weight.saturating_neg(),
        }
    }
}

/// Anything ordered by weight within a sibling list.
pub trait Weighted {
    fn weight(&self) -> i64;
}

/// Host ordering paired with its probed direction.
pub struct Sorter<'a> {
    pub direction: SortDirection,
    pub host: &'a dyn HostOrdering,
}

impl Sorter<'_> {
    /// Reorder `items` ascending by weight using the host's sort.
    pub fn arrange<T: Weighted>(&self, items: &mut Vec<T>) {
        let keys: Vec<i64> = items.iter().map(|item| self.direction.key(item.weight())).collect();
        let order = self.host.permutation(&keys);

        let mut slots: Vec<Option<T>> = items.drain(..).map(Some).collect();
        items.extend(order.into_iter().filter_map(|i| slots.get_mut(i).and_then(Option::take)));
        // Anything a misbehaving host left out keeps its relative position at the end.
        items.extend(slots.into_iter().flatten());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Item(&'static str, i64);

    impl Weighted for Item {
        fn weight(&self) -> i64 {
            self.1
        }
    }

    fn items() -> Vec<Item> {
        vec![Item("a", 900), Item("b", 50), Item("c", 0), Item("d", 51), Item("e", 50)]
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.0).collect()
    }

    #[test]
    fn probe_detects_polarity() {
        assert_eq!(SortDirection::probe(&NativeAscending), SortDirection::Ascending);
        assert_eq!(SortDirection::probe(&NativeDescending), SortDirection::Descending);
    }

    #[test]
    fn direction_cancels_host_polarity() {
        let hosts: [&dyn HostOrdering; 2] = [&NativeAscending, &NativeDescending];
        for host in hosts {
            let sorter = Sorter {
                direction: SortDirection::probe(host),
                host,
            };
            let mut list = items();
            sorter.arrange(&mut list);
            let weights: Vec<i64> = list.iter().map(|i| i.1).collect();
            assert_eq!(weights, vec![0, 50, 50, 51, 900]);
        }
    }

    #[test]
    fn ties_keep_host_order() {
        let sorter = Sorter {
            direction: SortDirection::Ascending,
            host: &NativeAscending,
        };
        let mut list = items();
        sorter.arrange(&mut list);
        assert_eq!(names(&list), vec!["c", "b", "e", "d", "a"]);
    }

    struct Truncating;

    impl HostOrdering for Truncating {
        fn permutation(&self, keys: &[i64]) -> Vec<usize> {
            (0..keys.len().saturating_sub(1)).collect()
        }
    }

    #[test]
    fn misbehaving_host_never_loses_items() {
        let sorter = Sorter {
            direction: SortDirection::Ascending,
            host: &Truncating,
        };
        let mut list = items();
        sorter.arrange(&mut list);
        assert_eq!(list.len(), 5);
    }
}
