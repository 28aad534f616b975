use std::collections::{HashMap, VecDeque};

use primitive::map::hash_map::HashMapExt;

use crate::{QuantityKind, Sample, Time};

pub const DEFAULT_QUEUE_SIZE: usize = 1 << 16;

/// Bounded per-quantity sample history.
#[derive(Debug, Clone)]
pub struct SampleStore {
    quantities: HashMap<QuantityKind, SampleQueue>,
    queue_size: usize,
}
impl SampleStore {
    pub fn new(queue_size: usize) -> Self {
        Self {
            quantities: HashMap::new(),
            queue_size,
        }
    }

    pub fn push(&mut self, kind: QuantityKind) -> impl FnMut(Sample) + use<'_> {
        let queue = self.quantities.ensure(&kind, SampleQueue::new);
        |sample: Sample| {
            queue.push(sample, self.queue_size);
        }
    }
    pub fn queue(&self, kind: QuantityKind) -> Option<&SampleQueue> {
        self.quantities.get(&kind)
    }

    /// Mean of the `kind` samples inside `range`; `None` when there are none.
    pub fn average(&self, kind: QuantityKind, range: core::ops::Range<Time>) -> Option<f64> {
        self.queue(kind)?.average(range)
    }
}
impl Default for SampleStore {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_SIZE)
    }
}

#[derive(Debug, Clone)]
pub struct SampleQueue {
    buf: VecDeque<Sample>,
}
impl SampleQueue {
    pub fn new() -> Self {
        let buf = VecDeque::new();
        Self { buf }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, sample: Sample, queue_size: usize) {
        if queue_size == 0 {
            return;
        }
        while queue_size <= self.buf.len() {
            self.buf.pop_front();
        }
        self.buf.push_back(sample);
    }

    /// Samples with `range.start <= time < range.end`, in arrival order.
    ///
    /// Arrival order need not be chronological.
    pub fn span(&self, range: core::ops::Range<Time>) -> impl Iterator<Item = &Sample> + '_ {
        self.buf.iter().filter(move |sample| range.contains(&sample.time))
    }

    pub fn average(&self, range: core::ops::Range<Time>) -> Option<f64> {
        let mut n: usize = 0;
        let mut sum = 0.;
        for sample in self.span(range) {
            n += 1;
            sum += sample.value;
        }
        if n == 0 {
            return None;
        }
        Some(sum / n as f64)
    }
}
impl Default for SampleQueue {
    fn default() -> Self {
        Self::new()
    }
}
