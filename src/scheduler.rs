use crate::error::{Error, Result};
use crate::launch::{LaunchRecord, TriggerType};
use crate::signals::{AnnotatedTrigger, DomId, Positive};
use std::cmp::Ordering;
use std::ops::Add;

#[derive(Clone, Debug, PartialEq)]
enum SchedulerState<T> {
    Idle,
    // A launch window is open. Triggers before `start + merge_window` are
    // merged into this launch.
    Capturing {
        start: T,
        lc_bit: bool,
        triggers: Vec<T>,
    },
    Deadtime {
        until: T,
    },
}

/// What happened to an input of the [`LaunchScheduler`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// The trigger opened a new launch window.
    Opened,
    /// The trigger was merged into the open launch window.
    Merged,
    /// The input arrived during the launch deadtime and was discarded.
    DeadTime,
    /// The trigger arrived during the launch deadtime of a multi-frame
    /// simulation. It does not launch but neighbors may still see it in the
    /// next frame.
    Held,
    /// A CPU requested launch was emitted immediately.
    Launched,
}

/// Launch state machine of a single DOM.
///
/// `Idle -> Capturing -> Deadtime -> Idle`. The first trigger opens a launch
/// window of `merge_window`; every trigger before the window closes is
/// merged into the same launch (the LC bit is OR-ed, the capture start stays
/// at the earliest trigger). When the window closes the launch is emitted
/// and no new launch can start during the following `deadtime`.
#[derive(Clone, Debug)]
pub struct LaunchScheduler<T> {
    sensor: DomId,
    state: SchedulerState<T>,
    merge_window: Positive<T>,
    deadtime: Positive<T>,
    // Multi-frame mode: deadtime triggers are reported as held.
    hold_dead_time: bool,
    last_time: Option<T>,
    // End of the deadtime of the last emitted launch.
    busy_until: Option<T>,
}

impl<T> LaunchScheduler<T> {
    pub fn new(
        sensor: DomId,
        merge_window: Positive<T>,
        deadtime: Positive<T>,
        hold_dead_time: bool,
    ) -> Self {
        Self {
            sensor,
            state: SchedulerState::Idle,
            merge_window,
            deadtime,
            hold_dead_time,
            last_time: None,
            busy_until: None,
        }
    }

    pub fn sensor(&self) -> DomId {
        self.sensor
    }

    /// Whether a launch window is open (i.e. a launch is pending).
    pub fn is_capturing(&self) -> bool {
        matches!(self.state, SchedulerState::Capturing { .. })
    }

    /// Trigger times merged into the pending launch, if any.
    pub fn pending_triggers(&self) -> &[T] {
        match &self.state {
            SchedulerState::Capturing { triggers, .. } => triggers,
            _ => &[],
        }
    }

    /// Sets the LC bit of the pending launch if `coincident` returns `true`
    /// for any of its triggers. Used when a launch was carried over from a
    /// previous frame and new neighbor triggers are known.
    pub fn reannotate<F>(&mut self, mut coincident: F)
    where
        F: FnMut(&T) -> bool,
    {
        if let SchedulerState::Capturing {
            lc_bit, triggers, ..
        } = &mut self.state
        {
            if !*lc_bit {
                *lc_bit = triggers.iter().any(&mut coincident);
            }
        }
    }

    /// Forgets everything, including a pending launch.
    pub fn reset(&mut self) {
        self.state = SchedulerState::Idle;
        self.last_time = None;
        self.busy_until = None;
    }

    fn corruption(&self, reason: &'static str) -> Error {
        Error::StateCorruption {
            sensor: self.sensor,
            reason,
        }
    }
}

impl<T> LaunchScheduler<T>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    pub fn last_time(&self) -> Option<T> {
        self.last_time
    }

    /// Feeds an annotated discriminator trigger. Launches finalized on the
    /// way are appended to `out`.
    pub fn accept(
        &mut self,
        trigger: &AnnotatedTrigger<T>,
        out: &mut Vec<LaunchRecord<T>>,
    ) -> Result<Disposition> {
        if trigger.sensor != self.sensor {
            return Err(self.corruption("trigger routed to the wrong DOM"));
        }
        self.check_order(trigger.time)?;
        self.advance(trigger.time, out);

        match &mut self.state {
            SchedulerState::Capturing {
                lc_bit, triggers, ..
            } => {
                // Never cleared once set.
                *lc_bit |= trigger.lc_bit;
                triggers.push(trigger.time);
                Ok(Disposition::Merged)
            }
            SchedulerState::Deadtime { .. } if self.hold_dead_time => Ok(Disposition::Held),
            SchedulerState::Deadtime { .. } => Ok(Disposition::DeadTime),
            SchedulerState::Idle => {
                if self.busy_until.is_some_and(|until| trigger.time < until) {
                    return Err(self.corruption("launch opened before the deadtime ended"));
                }
                self.state = SchedulerState::Capturing {
                    start: trigger.time,
                    lc_bit: trigger.lc_bit,
                    triggers: vec![trigger.time],
                };
                Ok(Disposition::Opened)
            }
        }
    }

    /// Feeds a CPU requested (beacon) launch request. It launches right away
    /// if the DOM is idle and is discarded otherwise. Beacon launches never
    /// have the LC bit set.
    pub fn beacon(&mut self, time: T, out: &mut Vec<LaunchRecord<T>>) -> Result<Disposition> {
        self.check_order(time)?;
        self.advance(time, out);

        if !matches!(self.state, SchedulerState::Idle) {
            return Ok(Disposition::DeadTime);
        }
        if self.busy_until.is_some_and(|until| time < until) {
            return Err(self.corruption("beacon launch before the deadtime ended"));
        }
        let until = time + *self.deadtime.inner();
        self.state = SchedulerState::Deadtime { until };
        self.busy_until = Some(until);
        out.push(LaunchRecord {
            sensor: self.sensor,
            capture_start_time: time,
            lc_bit: false,
            trigger_type: TriggerType::CpuRequested,
            trigger_times: vec![time],
        });

        Ok(Disposition::Launched)
    }

    /// End of frame. Closes the launch window if it has elapsed at `now` (the
    /// latest time seen in the frame on any DOM), then emits a still pending
    /// launch if `force` is set or if its LC bit is already set. Otherwise the
    /// launch stays pending across the frame boundary.
    ///
    /// An emitted launch is final: triggers of the next frame that fall in
    /// what would have been its merge window hit the deadtime instead.
    ///
    /// The deadtime itself only ends on an input of this DOM, so `now` never
    /// makes the DOM idle.
    ///
    /// Returns `true` if a launch was left pending.
    pub fn flush(&mut self, now: Option<T>, force: bool, out: &mut Vec<LaunchRecord<T>>) -> bool {
        if let (Some(now), SchedulerState::Capturing { start, .. }) = (now, &self.state) {
            if now >= *start + *self.merge_window.inner() {
                self.finalize(out);
            }
        }
        match self.state {
            SchedulerState::Capturing { lc_bit, .. } if force || lc_bit => {
                self.finalize(out);
                false
            }
            SchedulerState::Capturing { .. } => true,
            _ => false,
        }
    }

    fn check_order(&mut self, time: T) -> Result<()> {
        let last = self.last_time.unwrap_or(time);
        match time.partial_cmp(&last) {
            Some(Ordering::Equal | Ordering::Greater) => {
                self.last_time = Some(time);
                Ok(())
            }
            Some(Ordering::Less) | None => Err(self.corruption("trigger out of time order")),
        }
    }

    // Moves through every transition that is due at `time`.
    fn advance(&mut self, time: T, out: &mut Vec<LaunchRecord<T>>) {
        loop {
            match self.state {
                SchedulerState::Capturing { start, .. }
                    if time >= start + *self.merge_window.inner() =>
                {
                    self.finalize(out)
                }
                SchedulerState::Deadtime { until } if time >= until => {
                    self.state = SchedulerState::Idle
                }
                _ => return,
            }
        }
    }

    fn finalize(&mut self, out: &mut Vec<LaunchRecord<T>>) {
        let SchedulerState::Capturing {
            start,
            lc_bit,
            triggers,
        } = std::mem::replace(&mut self.state, SchedulerState::Idle)
        else {
            return;
        };
        let until = start + *self.merge_window.inner() + *self.deadtime.inner();
        self.state = SchedulerState::Deadtime { until };
        self.busy_until = Some(until);

        out.push(LaunchRecord {
            sensor: self.sensor,
            capture_start_time: start,
            lc_bit,
            trigger_type: TriggerType::SpeDiscriminator,
            trigger_times: triggers,
        });
    }
}
