use crate::queue::PulseQueue;
use crate::signals::{Positive, Pulse, Trigger};
use std::collections::VecDeque;
use std::ops::Add;

#[derive(Clone, Debug)]
enum DiscriminatorState<T> {
    // Accumulating charge towards the next threshold crossing. `window` only
    // holds pulses when an accumulation window is configured; `charge` is
    // their sum (or the sum of every pulse since arming, without a window).
    Armed {
        window: VecDeque<Pulse<T>>,
        charge: f64,
    },
    // Refractory period after a crossing. Pulses before `until` are ignored.
    Dead { until: T },
}

impl<T> DiscriminatorState<T> {
    fn armed() -> Self {
        Self::Armed {
            window: VecDeque::new(),
            charge: 0.0,
        }
    }
}

/// Discriminator of a single DOM.
///
/// Converts a time ordered stream of [`Pulse`]s into threshold crossings. A
/// crossing happens at the time of the pulse that brings the accumulated
/// charge to (or above) the threshold. After a crossing, no pulse
/// contributes to a new crossing until the deadtime has elapsed; a pulse
/// exactly at the end of the deadtime already counts. Accumulation restarts
/// at zero after the deadtime.
///
/// With an accumulation `window`, only pulses that arrived less than
/// `window` before the current one contribute to the accumulated charge.
#[derive(Clone, Debug)]
pub struct Discriminator<T> {
    state: DiscriminatorState<T>,
    threshold: f64,
    deadtime: Positive<T>,
    window: Option<Positive<T>>,
}

impl<T> Discriminator<T> {
    /// Creates a new armed discriminator. `threshold` is in PE.
    pub fn new(threshold: f64, deadtime: Positive<T>, window: Option<Positive<T>>) -> Self {
        Self {
            state: DiscriminatorState::armed(),
            threshold,
            deadtime,
            window,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Forgets any accumulated charge and deadtime.
    pub fn reset(&mut self) {
        self.state = DiscriminatorState::armed();
    }
}

impl<T> Discriminator<T>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    /// Feeds a single pulse. Returns the crossing time if this pulse caused a
    /// threshold crossing.
    ///
    /// Pulses must be fed in non-decreasing time order; use [`drain`] to get
    /// that guarantee from a validated [`PulseQueue`].
    ///
    /// [`drain`]: Discriminator::drain
    pub(crate) fn process(&mut self, pulse: &Pulse<T>) -> Option<T> {
        match std::mem::replace(&mut self.state, DiscriminatorState::armed()) {
            DiscriminatorState::Dead { until } if pulse.time < until => {
                self.state = DiscriminatorState::Dead { until };
                None
            }
            DiscriminatorState::Dead { .. } => self.accumulate(VecDeque::new(), 0.0, pulse),
            DiscriminatorState::Armed { window, charge } => self.accumulate(window, charge, pulse),
        }
    }

    fn accumulate(
        &mut self,
        mut window: VecDeque<Pulse<T>>,
        mut charge: f64,
        pulse: &Pulse<T>,
    ) -> Option<T> {
        if let Some(length) = &self.window {
            while let Some(old) = window.front() {
                if old.time + *length.inner() > pulse.time {
                    break;
                }
                charge -= old.charge;
                window.pop_front();
            }
            if window.is_empty() {
                // No rounding residue from the subtractions.
                charge = 0.0;
            }
            window.push_back(*pulse);
        }
        charge += pulse.charge;

        if charge >= self.threshold {
            self.state = DiscriminatorState::Dead {
                until: pulse.time + *self.deadtime.inner(),
            };
            Some(pulse.time)
        } else {
            self.state = DiscriminatorState::Armed { window, charge };
            None
        }
    }

    /// Runs every buffered pulse of `queue` through the discriminator and
    /// returns the resulting threshold crossings in time order. The queue is
    /// left empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use domlauncher::discriminator::Discriminator;
    /// use domlauncher::queue::PulseQueue;
    /// use domlauncher::signals::{DomId, Positive, Pulse};
    ///
    /// let mut queue = PulseQueue::new(DomId::new(47, 2));
    /// queue.submit([Pulse::new(0, 0.5), Pulse::new(2, 0.5), Pulse::new(4, 1.0)])?;
    ///
    /// let mut disc = Discriminator::new(1.0, Positive::new(3).unwrap(), None);
    /// let times: Vec<_> = disc.drain(&mut queue).into_iter().map(|t| t.time).collect();
    /// assert_eq!(times, vec![2]);
    /// # Ok::<(), domlauncher::Error>(())
    /// ```
    pub fn drain(&mut self, queue: &mut PulseQueue<T>) -> Vec<Trigger<T>> {
        let sensor = queue.sensor();
        let mut triggers = Vec::new();
        while let Some(pulse) = queue.pop() {
            if let Some(time) = self.process(&pulse) {
                triggers.push(Trigger { sensor, time });
            }
        }
        tracing::trace!(%sensor, crossings = triggers.len(), "discriminator drained");

        triggers
    }
}
