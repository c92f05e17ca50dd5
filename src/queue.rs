use crate::error::{Error, Result};
use crate::signals::{DomId, Pulse};
use std::cmp::Ordering;
use std::collections::VecDeque;

/// Time ordered buffer of the [`Pulse`]s submitted for a single DOM.
///
/// Pulses are validated when they enter the queue, so everything downstream
/// (i.e. the discriminator) can rely on non-decreasing times and positive,
/// finite charges.
#[derive(Clone, Debug)]
pub struct PulseQueue<T> {
    sensor: DomId,
    pulses: VecDeque<Pulse<T>>,
    // Latest accepted pulse time. Survives `clear` so that pulses of a
    // following frame can not go back in time.
    horizon: Option<T>,
}

impl<T> PulseQueue<T> {
    pub fn new(sensor: DomId) -> Self {
        Self {
            sensor,
            pulses: VecDeque::new(),
            horizon: None,
        }
    }

    pub fn sensor(&self) -> DomId {
        self.sensor
    }

    /// Returns the earliest buffered pulse.
    pub fn peek(&self) -> Option<&Pulse<T>> {
        self.pulses.front()
    }

    /// Removes and returns the earliest buffered pulse.
    pub fn pop(&mut self) -> Option<Pulse<T>> {
        self.pulses.pop_front()
    }

    pub fn len(&self) -> usize {
        self.pulses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pulses.is_empty()
    }

    /// Drops all buffered pulses. The ordering horizon is kept.
    pub fn clear(&mut self) {
        self.pulses.clear();
    }

    /// Drops all buffered pulses and forgets the ordering horizon.
    pub fn reset(&mut self) {
        self.pulses.clear();
        self.horizon = None;
    }
}

impl<T: PartialOrd + Copy> PulseQueue<T> {
    /// Latest pulse time ever accepted (since the last [`reset`]).
    ///
    /// [`reset`]: PulseQueue::reset
    pub fn horizon(&self) -> Option<T> {
        self.horizon
    }

    /// Appends a single pulse.
    ///
    /// # Examples
    ///
    /// ```
    /// use domlauncher::queue::PulseQueue;
    /// use domlauncher::signals::{DomId, Pulse};
    ///
    /// let mut queue = PulseQueue::new(DomId::new(47, 2));
    /// queue.push(Pulse::new(10.0, 1.0))?;
    /// assert!(queue.push(Pulse::new(5.0, 1.0)).is_err());
    /// assert!(queue.push(Pulse::new(20.0, -1.0)).is_err());
    /// assert_eq!(queue.len(), 1);
    /// # Ok::<(), domlauncher::Error>(())
    /// ```
    pub fn push(&mut self, pulse: Pulse<T>) -> Result<()> {
        self.check(&pulse, self.horizon, 0)?;
        self.horizon = Some(pulse.time);
        self.pulses.push_back(pulse);
        Ok(())
    }

    /// Appends a sequence of pulses. Either all of them are accepted, or the
    /// queue is left untouched and the first offending pulse is reported.
    ///
    /// Returns the number of accepted pulses.
    pub fn submit<I>(&mut self, pulses: I) -> Result<usize>
    where
        I: IntoIterator<Item = Pulse<T>>,
    {
        let mut horizon = self.horizon;
        let mut staged = Vec::new();
        for (index, pulse) in pulses.into_iter().enumerate() {
            self.check(&pulse, horizon, index)?;
            horizon = Some(pulse.time);
            staged.push(pulse);
        }

        let accepted = staged.len();
        self.pulses.extend(staged);
        self.horizon = horizon;

        Ok(accepted)
    }

    fn check(&self, pulse: &Pulse<T>, horizon: Option<T>, index: usize) -> Result<()> {
        if !(pulse.charge.is_finite() && pulse.charge > 0.0) {
            return Err(Error::InvalidCharge {
                sensor: self.sensor,
                index,
                charge: pulse.charge,
            });
        }
        // Compared against itself to reject unorderable times such as NaN.
        let previous = horizon.unwrap_or(pulse.time);
        match pulse.time.partial_cmp(&previous) {
            Some(Ordering::Equal | Ordering::Greater) => Ok(()),
            Some(Ordering::Less) | None => Err(Error::InputOrder {
                sensor: self.sensor,
                index,
            }),
        }
    }
}
