use crate::graph::NeighborGraph;
use crate::signals::{AnnotatedTrigger, Positive, Trigger};
use std::collections::VecDeque;
use std::ops::Add;

/// Recent trigger times of a single DOM, kept sorted and without duplicates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TriggerHistory<T> {
    times: VecDeque<T>,
}

impl<T> TriggerHistory<T> {
    pub fn new() -> Self {
        Self {
            times: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn clear(&mut self) {
        self.times.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.times.iter()
    }
}

impl<T> TriggerHistory<T>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    /// Records a trigger time. Times usually arrive in order; out of order
    /// times are inserted at their sorted position. A time that is already
    /// recorded is ignored.
    pub fn record(&mut self, time: T) {
        match self.times.back() {
            Some(last) if time <= *last => {
                let at = self.times.partition_point(|t| *t < time);
                if self.times.get(at) != Some(&time) {
                    self.times.insert(at, time);
                }
            }
            _ => self.times.push_back(time),
        }
    }

    /// Returns `true` if any recorded time `t'` satisfies
    /// `|time - t'| <= window`.
    pub fn contains_within(&self, time: T, window: &Positive<T>) -> bool {
        let window = *window.inner();
        let first = self.times.partition_point(|t| *t + window < time);
        self.times.get(first).is_some_and(|t| *t <= time + window)
    }

    /// Drops every time that can no longer be in coincidence with a trigger
    /// at or after `horizon`.
    pub fn retain_recent(&mut self, horizon: T, window: &Positive<T>) {
        let window = *window.inner();
        while self.times.front().is_some_and(|t| *t + window < horizon) {
            self.times.pop_front();
        }
    }
}

impl<T> Extend<T> for TriggerHistory<T>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for time in iter {
            self.record(time);
        }
    }
}

/// Read-only view used to decide the LC bit of triggers.
///
/// Holds a snapshot of the trigger history of every DOM, indexed like the
/// DOMs of the [`NeighborGraph`]. A trigger at time `T` on DOM `S` is in local
/// coincidence iff a neighbor of `S` has a recorded trigger `T'` with
/// `|T - T'| <= window`. Because the histories are complete before any
/// trigger is annotated, neighbor triggers that come after `T` count as well.
#[derive(Clone, Copy, Debug)]
pub struct CoincidenceResolver<'a, T> {
    graph: &'a NeighborGraph,
    histories: &'a [TriggerHistory<T>],
    window: Positive<T>,
}

impl<'a, T> CoincidenceResolver<'a, T>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    /// `histories[i]` must belong to `graph.sensors()[i]`.
    pub fn new(
        graph: &'a NeighborGraph,
        histories: &'a [TriggerHistory<T>],
        window: Positive<T>,
    ) -> Self {
        debug_assert_eq!(graph.len(), histories.len());
        Self {
            graph,
            histories,
            window,
        }
    }

    /// Whether a neighbor of the DOM at `index` triggered within the window
    /// around `time`.
    pub fn has_coincidence(&self, index: usize, time: T) -> bool {
        self.graph
            .neighbor_indices(index)
            .iter()
            .filter_map(|&n| self.histories.get(n))
            .any(|history| history.contains_within(time, &self.window))
    }

    /// Decides the LC bit of `trigger`. DOMs unknown to the graph have no
    /// neighbors, so their triggers never have the LC bit set.
    pub fn annotate(&self, trigger: &Trigger<T>) -> AnnotatedTrigger<T> {
        let lc_bit = self
            .graph
            .index_of(&trigger.sensor)
            .is_some_and(|index| self.has_coincidence(index, trigger.time));

        trigger.annotate(lc_bit)
    }
}
