use crate::error::{Error, Result};
use crate::signals::DomId;
use std::collections::btree_map;
use std::collections::BTreeMap;

/// What caused a launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// Launch started by a discriminator crossing (SPE-like trigger).
    SpeDiscriminator,
    /// Launch requested by the DOM CPU (beacon launch).
    CpuRequested,
}

/// A finalized waveform capture of a DOM.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchRecord<T> {
    pub sensor: DomId,
    /// Time of the earliest trigger that contributed to this launch.
    pub capture_start_time: T,
    pub lc_bit: bool,
    pub trigger_type: TriggerType,
    /// Times of every trigger merged into this launch, in order. This is the
    /// payload handed to the digitizer stage.
    pub trigger_times: Vec<T>,
}

/// Finalized launches of a frame, keyed by DOM.
///
/// Launches of a DOM are kept in arrival order, which must also be strictly
/// increasing capture start time order. DOMs without launches are absent.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchMap<T> {
    inner: BTreeMap<DomId, Vec<LaunchRecord<T>>>,
}

impl<T> LaunchMap<T> {
    pub fn new() -> Self {
        Self {
            inner: BTreeMap::new(),
        }
    }

    pub fn get(&self, sensor: &DomId) -> Option<&[LaunchRecord<T>]> {
        self.inner.get(sensor).map(Vec::as_slice)
    }

    pub fn contains_key(&self, sensor: &DomId) -> bool {
        self.inner.contains_key(sensor)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DomId> {
        self.inner.keys()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, DomId, Vec<LaunchRecord<T>>> {
        self.inner.iter()
    }

    /// Number of DOMs with at least one launch.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of launches across all DOMs.
    pub fn total_launches(&self) -> usize {
        self.inner.values().map(Vec::len).sum()
    }

    pub fn into_inner(self) -> BTreeMap<DomId, Vec<LaunchRecord<T>>> {
        self.inner
    }
}

impl<T: PartialOrd> LaunchMap<T> {
    /// Appends a launch to its DOM's series.
    pub fn insert(&mut self, record: LaunchRecord<T>) -> Result<()> {
        let series = self.inner.entry(record.sensor).or_default();
        if let Some(last) = series.last() {
            if !(last.capture_start_time < record.capture_start_time) {
                return Err(Error::StateCorruption {
                    sensor: record.sensor,
                    reason: "launches out of capture start time order",
                });
            }
        }
        series.push(record);

        Ok(())
    }
}

impl<T> Default for LaunchMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IntoIterator for LaunchMap<T> {
    type Item = (DomId, Vec<LaunchRecord<T>>);
    type IntoIter = btree_map::IntoIter<DomId, Vec<LaunchRecord<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a LaunchMap<T> {
    type Item = (&'a DomId, &'a Vec<LaunchRecord<T>>);
    type IntoIter = btree_map::Iter<'a, DomId, Vec<LaunchRecord<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}
