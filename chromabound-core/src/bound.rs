//! Process-wide upper bound on the optimum color count.

use std::sync::atomic::{AtomicU32, Ordering};

/// The live upper bound shared by a rank's search thread and its bound
/// listener.
///
/// The value only ever decreases. Reads use relaxed ordering: a stale,
/// larger value merely delays a prune and costs extra work, it can never
/// make pruning incorrect.
#[derive(Debug)]
pub struct SharedBound {
    value: AtomicU32,
}

impl SharedBound {
    /// Creates a bound starting at `initial`.
    pub fn new(initial: u32) -> Self {
        Self {
            value: AtomicU32::new(initial),
        }
    }

    /// The canonical starting bound for a graph on `n` vertices: `n + 1`,
    /// which any feasible coloring improves.
    pub fn for_vertices(n: usize) -> Self {
        Self::new(n as u32 + 1)
    }

    /// Current value.
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Lowers the bound to `candidate` if it is strictly better.
    ///
    /// Returns whether the bound moved. Safe under concurrent callers: the
    /// compare-exchange loop preserves monotonic non-increase no matter how
    /// updates interleave.
    pub fn tighten(&self, candidate: u32) -> bool {
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            if candidate >= current {
                return false;
            }
            match self.value.compare_exchange_weak(
                current,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_tighten_only_lowers() {
        let bound = SharedBound::new(6);
        assert!(bound.tighten(4));
        assert_eq!(bound.get(), 4);
        assert!(!bound.tighten(4));
        assert!(!bound.tighten(5));
        assert_eq!(bound.get(), 4);
        assert!(bound.tighten(2));
        assert_eq!(bound.get(), 2);
    }

    #[test]
    fn test_initial_bound_for_vertices() {
        let bound = SharedBound::for_vertices(10);
        assert_eq!(bound.get(), 11);
    }

    #[test]
    fn test_concurrent_tighten_is_monotonic() {
        let bound = Arc::new(SharedBound::new(1000));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let bound = Arc::clone(&bound);
                std::thread::spawn(move || {
                    for candidate in (t * 250..(t + 1) * 250).rev() {
                        bound.tighten(candidate);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(bound.get(), 0);
    }
}
