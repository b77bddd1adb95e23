//! Thread-safe insight accumulation shared by the two schedulers.
//!
//! The aggregator exposes exactly two operations, split across two traits so
//! the detection side only holds [`InsightSink`] (write-only) and the report
//! side only holds [`InsightDrain`] (drain-only).
//!
//! Both operations take the same short critical section. `drain_all` swaps the
//! pending buffer out under the lock, so an `add` racing with a drain lands
//! either in the returned snapshot or in the next window, never both.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::insight::Insight;

/// Write-only capability.
pub trait InsightSink: Send + Sync {
    fn add(&self, insight: Insight);
}

/// Drain-only capability.
pub trait InsightDrain: Send + Sync {
    /// Atomically take every pending insight, in insertion order.
    fn drain_all(&self) -> Vec<Insight>;
}

#[derive(Default)]
pub struct InsightAggregator {
    pending: Mutex<Vec<Insight>>,
}

impl InsightAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared aggregator, ready to be handed out as sink and drain.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // A panic while holding the lock cannot leave the Vec half-written, so
    // poisoning is safe to ignore.
    fn lock(&self) -> MutexGuard<'_, Vec<Insight>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl InsightSink for InsightAggregator {
    fn add(&self, insight: Insight) {
        self.lock().push(insight);
    }
}

impl InsightDrain for InsightAggregator {
    fn drain_all(&self) -> Vec<Insight> {
        std::mem::take(&mut *self.lock())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_drain_empty() {
        let agg = InsightAggregator::new();
        assert!(agg.drain_all().is_empty());
        assert!(agg.drain_all().is_empty());
    }

    #[test]
    fn test_drain_preserves_insertion_order_and_clears() {
        let agg = InsightAggregator::new();
        agg.add(Insight::new("latency", "first"));
        agg.add(Insight::new("error-rate", "second"));
        agg.add(Insight::new("latency", "third"));

        let drained: Vec<String> = agg.drain_all().into_iter().map(|i| i.text).collect();
        assert_eq!(drained, vec!["first", "second", "third"]);
        assert!(agg.drain_all().is_empty());

        agg.add(Insight::new("latency", "next window"));
        assert_eq!(agg.drain_all().len(), 1);
    }

    #[test]
    fn test_concurrent_adds_and_drains_lose_nothing() {
        const ADDERS: usize = 8;
        const DRAINERS: usize = 3;
        const PER_ADDER: usize = 2_000;

        let agg = InsightAggregator::shared();
        let done = Arc::new(AtomicBool::new(false));

        let adders: Vec<_> = (0..ADDERS)
            .map(|a| {
                let sink: Arc<dyn InsightSink> = agg.clone();
                thread::spawn(move || {
                    let mut ids = Vec::with_capacity(PER_ADDER);
                    for n in 0..PER_ADDER {
                        let insight = Insight::new("latency", &format!("{}-{}", a, n));
                        ids.push(insight.id);
                        sink.add(insight);
                    }
                    ids
                })
            })
            .collect();

        let drainers: Vec<_> = (0..DRAINERS)
            .map(|_| {
                let drain: Arc<dyn InsightDrain> = agg.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while !done.load(Ordering::Acquire) {
                        seen.extend(drain.drain_all().into_iter().map(|i| i.id));
                        thread::yield_now();
                    }
                    seen
                })
            })
            .collect();

        let mut added = HashSet::new();
        for h in adders {
            added.extend(h.join().unwrap());
        }
        done.store(true, Ordering::Release);

        let mut drained = Vec::new();
        for h in drainers {
            drained.extend(h.join().unwrap());
        }
        drained.extend(agg.drain_all().into_iter().map(|i| i.id));

        assert_eq!(added.len(), ADDERS * PER_ADDER);
        assert_eq!(drained.len(), added.len(), "loss or duplication detected");
        let unique: HashSet<_> = drained.into_iter().collect();
        assert_eq!(unique, added);
    }

    #[test]
    fn test_per_adder_order_is_kept_within_a_drain() {
        let agg = InsightAggregator::shared();
        let sink: Arc<dyn InsightSink> = agg.clone();
        let h = thread::spawn(move || {
            for n in 0..500 {
                sink.add(Insight::new("latency", &n.to_string()));
            }
        });
        h.join().unwrap();

        let nums: Vec<u32> = agg
            .drain_all()
            .into_iter()
            .map(|i| i.text.parse().unwrap())
            .collect();
        assert!(nums.windows(2).all(|w| w[0] < w[1]));
    }
}
