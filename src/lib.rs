use crate::coincidence::{CoincidenceResolver, TriggerHistory};
use crate::discriminator::Discriminator;
use crate::graph::NeighborGraph;
use crate::launch::{LaunchMap, LaunchRecord};
use crate::queue::PulseQueue;
use crate::scheduler::{Disposition, LaunchScheduler};
use crate::signals::{AnnotatedTrigger, DomId, Positive, Pulse, Trigger};
use bon::bon;
use rayon::prelude::*;
use std::marker::PhantomData;
use std::ops::Add;
use tracing::{debug, trace, warn};

pub use crate::error::{Error, Result};

/// Local coincidence decision.
pub mod coincidence;
/// Threshold discriminator.
pub mod discriminator;
pub mod error;
/// Utilities to generate input data for the launch simulation.
pub mod gen;
/// Local coincidence topology.
pub mod graph;
/// Launch records and their per-frame aggregation.
pub mod launch;
/// Per-DOM pulse buffering.
pub mod queue;
/// Launch state machine.
pub mod scheduler;
pub mod signals;
pub mod statistics;

/// A trait that defines the interface for an observer of the launch
/// simulation.
///
/// The default implementation of all methods is a no-op. Users are expected to
/// override the methods they are interested in.
#[allow(unused_variables)]
pub trait Observer {
    type Time;

    /// Called for every discriminator threshold crossing.
    fn on_trigger(&mut self, trigger: &Trigger<Self::Time>) {}
    /// Called when the LC bit of a trigger has been decided.
    fn on_annotated(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {}
    /// Called when a trigger is merged into an already open launch.
    fn on_merge(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {}
    /// Called when a trigger is discarded by the launch deadtime.
    fn on_dead_time(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {}
    /// Called when a trigger hits the launch deadtime in multi-frame mode. It
    /// does not launch but still counts for LC in the next frame.
    fn on_held(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {}
    /// Called when a beacon launch request is discarded because the DOM was
    /// busy.
    fn on_beacon_dropped(&mut self, sensor: DomId, time: &Self::Time) {}
    /// Called when a pending launch is kept across the frame boundary.
    fn on_deferred(&mut self, sensor: DomId) {}
    /// Called for every finalized launch.
    fn on_launch(&mut self, launch: &LaunchRecord<Self::Time>) {}
}

/// An [`Observer`] that ignores everything.
#[derive(Clone, Copy, Debug)]
pub struct NullObserver<T>(PhantomData<T>);

impl<T> Default for NullObserver<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Observer for NullObserver<T> {
    type Time = T;
}

/// Validated configuration of a [`Launcher`].
#[derive(Clone, Debug)]
pub struct Config<T> {
    discriminator_threshold: f64,
    discriminator_deadtime: Positive<T>,
    discriminator_window: Option<Positive<T>>,
    lc_window: Positive<T>,
    launch_merge_window: Positive<T>,
    launch_deadtime: Positive<T>,
    multi_frame_mode: bool,
}

impl<T: Copy> Config<T> {
    /// Charge (in PE) at which the discriminator fires.
    pub fn discriminator_threshold(&self) -> f64 {
        self.discriminator_threshold
    }

    pub fn discriminator_deadtime(&self) -> Positive<T> {
        self.discriminator_deadtime
    }

    pub fn discriminator_window(&self) -> Option<Positive<T>> {
        self.discriminator_window
    }

    pub fn lc_window(&self) -> Positive<T> {
        self.lc_window
    }

    pub fn launch_merge_window(&self) -> Positive<T> {
        self.launch_merge_window
    }

    pub fn launch_deadtime(&self) -> Positive<T> {
        self.launch_deadtime
    }

    pub fn multi_frame_mode(&self) -> bool {
        self.multi_frame_mode
    }
}

#[derive(Clone, Debug)]
struct SensorState<T> {
    queue: PulseQueue<T>,
    beacons: Vec<T>,
    discriminator: Discriminator<T>,
    scheduler: LaunchScheduler<T>,
    // Multi-frame mode: triggers of earlier frames that can still be in
    // coincidence with the next one.
    carried: TriggerHistory<T>,
}

/// Launch simulation of a set of DOMs.
///
/// Pulses are submitted per DOM and processed one frame at a time with
/// [`finalize_frame`](Launcher::finalize_frame). State between frames is
/// controlled with [`reset`](Launcher::reset).
#[derive(Clone, Debug)]
pub struct Launcher<T, O> {
    graph: NeighborGraph,
    config: Config<T>,
    // Indexed like `graph.sensors()`.
    sensors: Vec<SensorState<T>>,
    observer: O,
    // Latest time seen in the last finalized frame.
    frame_end: Option<T>,
}

#[bon]
impl<T, O> Launcher<T, O>
where
    T: Add<Output = T> + PartialOrd + Copy,
{
    #[builder]
    pub fn new(
        graph: NeighborGraph,
        discriminator_threshold: f64,
        discriminator_deadtime: Positive<T>,
        discriminator_window: Option<Positive<T>>,
        lc_window: Positive<T>,
        launch_merge_window: Positive<T>,
        launch_deadtime: Positive<T>,
        #[builder(default)] multi_frame_mode: bool,
        observer: O,
    ) -> Result<Self> {
        if !(discriminator_threshold.is_finite() && discriminator_threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "discriminator threshold must be a positive charge, got {discriminator_threshold} PE"
            )));
        }

        let sensors = graph
            .sensors()
            .iter()
            .map(|&sensor| SensorState {
                queue: PulseQueue::new(sensor),
                beacons: Vec::new(),
                discriminator: Discriminator::new(
                    discriminator_threshold,
                    discriminator_deadtime,
                    discriminator_window,
                ),
                scheduler: LaunchScheduler::new(
                    sensor,
                    launch_merge_window,
                    launch_deadtime,
                    multi_frame_mode,
                ),
                carried: TriggerHistory::new(),
            })
            .collect();
        debug!(sensors = graph.len(), multi_frame_mode, "launcher configured");

        Ok(Self {
            graph,
            config: Config {
                discriminator_threshold,
                discriminator_deadtime,
                discriminator_window,
                lc_window,
                launch_merge_window,
                launch_deadtime,
                multi_frame_mode,
            },
            sensors,
            observer,
            frame_end: None,
        })
    }
}

impl<T, O> Launcher<T, O> {
    pub fn graph(&self) -> &NeighborGraph {
        &self.graph
    }

    pub fn config(&self) -> &Config<T> {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn into_observer(self) -> O {
        self.observer
    }

    /// Number of DOMs with a launch still waiting to be emitted.
    pub fn pending_launches(&self) -> usize {
        self.sensors
            .iter()
            .filter(|s| s.scheduler.is_capturing())
            .count()
    }

    fn state_mut(&mut self, sensor: DomId) -> Result<&mut SensorState<T>> {
        self.graph
            .index_of(&sensor)
            .and_then(|index| self.sensors.get_mut(index))
            .ok_or(Error::UnknownSensor(sensor))
    }
}

impl<T, O> Launcher<T, O>
where
    T: Add<Output = T> + PartialOrd + Copy + Send,
    O: Observer<Time = T>,
{
    /// Queues the pulses of a DOM for the current frame. Pulses must be in
    /// non-decreasing time order, also with respect to earlier frames unless
    /// a hard reset happened in between.
    ///
    /// Either every pulse is accepted or none is. Returns the number of
    /// accepted pulses.
    pub fn submit_pulses<I>(&mut self, sensor: DomId, pulses: I) -> Result<usize>
    where
        I: IntoIterator<Item = Pulse<T>>,
    {
        let state = self.state_mut(sensor)?;
        let pulses: Vec<_> = pulses.into_iter().collect();
        if let (Some(first), Some(last)) = (pulses.first(), state.scheduler.last_time()) {
            if !(first.time >= last) {
                return Err(Error::InputOrder { sensor, index: 0 });
            }
        }

        let accepted = state.queue.submit(pulses)?;
        if accepted == 0 {
            warn!(%sensor, "empty pulse series");
        } else {
            trace!(%sensor, accepted, "pulses queued");
        }

        Ok(accepted)
    }

    /// Queues CPU requested (beacon) launch times of a DOM for the current
    /// frame. Same ordering rules as [`submit_pulses`].
    ///
    /// [`submit_pulses`]: Launcher::submit_pulses
    pub fn submit_beacons<I>(&mut self, sensor: DomId, times: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let state = self.state_mut(sensor)?;
        let mut horizon = state
            .beacons
            .last()
            .copied()
            .or(state.scheduler.last_time());
        let mut staged = Vec::new();
        for (index, time) in times.into_iter().enumerate() {
            let previous = horizon.unwrap_or(time);
            if !(time >= previous) {
                return Err(Error::InputOrder { sensor, index });
            }
            horizon = Some(time);
            staged.push(time);
        }

        let accepted = staged.len();
        state.beacons.extend(staged);
        trace!(%sensor, accepted, "beacons queued");

        Ok(accepted)
    }

    /// Processes every queued pulse and beacon and returns the launches
    /// finalized in this frame.
    ///
    /// Without `force`, a launch that is still open at the end of the frame
    /// and does not have its LC bit set yet is kept for the next frame. This
    /// only applies in multi-frame mode; otherwise every open launch is
    /// emitted.
    ///
    /// An open launch whose LC bit is already set is emitted at the end of
    /// the frame even without `force`. Triggers of the next frame that would
    /// still have fallen in its merge window are not merged into it; they hit
    /// the launch deadtime instead.
    ///
    /// In multi-frame mode every trigger of the frame stays coincidence
    /// history for the triggers of the next frame, as long as it is within
    /// `lc_window` of the frame end.
    pub fn finalize_frame(&mut self, force: bool) -> Result<LaunchMap<T>> {
        let force = force || !self.config.multi_frame_mode;

        let triggers: Vec<Vec<Trigger<T>>> = self
            .sensors
            .par_iter_mut()
            .map(|state| state.discriminator.drain(&mut state.queue))
            .collect();
        debug!(
            triggers = triggers.iter().map(Vec::len).sum::<usize>(),
            "discriminator pass done"
        );

        // Every trigger of the frame is known before any LC bit is decided,
        // so later neighbor triggers count as well.
        let histories: Vec<TriggerHistory<T>> = self
            .sensors
            .iter()
            .zip(&triggers)
            .map(|(state, new)| {
                let mut history = state.carried.clone();
                history.extend(state.scheduler.pending_triggers().iter().copied());
                history.extend(new.iter().map(|t| t.time));
                history
            })
            .collect();
        for trigger in triggers.iter().flatten() {
            self.observer.on_trigger(trigger);
        }
        let resolver = CoincidenceResolver::new(&self.graph, &histories, self.config.lc_window);

        let mut launches = Vec::with_capacity(self.sensors.len());
        for (index, (state, new)) in self.sensors.iter_mut().zip(triggers).enumerate() {
            let mut out = Vec::new();
            state
                .scheduler
                .reannotate(|&time| resolver.has_coincidence(index, time));

            let mut beacons = std::mem::take(&mut state.beacons).into_iter().peekable();
            for trigger in new {
                // On a tie the trigger goes first.
                while let Some(time) = beacons.next_if(|&b| b < trigger.time) {
                    feed_beacon(&mut state.scheduler, &mut self.observer, time, &mut out)?;
                }

                let annotated = resolver.annotate(&trigger);
                self.observer.on_annotated(&annotated);
                match state.scheduler.accept(&annotated, &mut out)? {
                    Disposition::Merged => self.observer.on_merge(&annotated),
                    Disposition::DeadTime => self.observer.on_dead_time(&annotated),
                    Disposition::Held => self.observer.on_held(&annotated),
                    Disposition::Opened | Disposition::Launched => {}
                }
            }
            for time in beacons {
                feed_beacon(&mut state.scheduler, &mut self.observer, time, &mut out)?;
            }
            launches.push(out);
        }

        let now = self
            .sensors
            .iter()
            .filter_map(|s| s.scheduler.last_time())
            .reduce(|a, b| if b > a { b } else { a });
        if now.is_some() {
            self.frame_end = now;
        }
        if self.config.multi_frame_mode {
            let window = self.config.lc_window;
            for (state, mut history) in self.sensors.iter_mut().zip(histories) {
                if let Some(end) = self.frame_end {
                    history.retain_recent(end, &window);
                }
                state.carried = history;
            }
        }

        let mut map = LaunchMap::new();
        let mut deferred = 0;
        for (state, mut out) in self.sensors.iter_mut().zip(launches) {
            if state.scheduler.flush(now, force, &mut out) {
                deferred += 1;
                self.observer.on_deferred(state.scheduler.sensor());
            }
            for record in out {
                self.observer.on_launch(&record);
                map.insert(record)?;
            }
        }
        debug!(
            launches = map.total_launches(),
            sensors = map.len(),
            deferred,
            force,
            "frame finalized"
        );

        Ok(map)
    }

    /// Prepares for the next frame.
    ///
    /// Both kinds drop unprocessed input and discriminator state. A hard
    /// reset also forgets pending launches, launch deadtime, trigger history
    /// and time ordering, so the same input can be replayed. A soft reset
    /// keeps pending launches open and, in multi-frame mode, the recent
    /// triggers as coincidence history for the next frame.
    pub fn reset(&mut self, hard: bool) {
        for state in &mut self.sensors {
            state.discriminator.reset();
            state.beacons.clear();
            if hard {
                state.queue.reset();
                state.scheduler.reset();
                state.carried.clear();
            } else {
                state.queue.clear();
            }
        }
        if hard {
            self.frame_end = None;
        }
        debug!(hard, pending = self.pending_launches(), "reset");
    }
}

fn feed_beacon<T, O>(
    scheduler: &mut LaunchScheduler<T>,
    observer: &mut O,
    time: T,
    out: &mut Vec<LaunchRecord<T>>,
) -> Result<()>
where
    T: Add<Output = T> + PartialOrd + Copy,
    O: Observer<Time = T>,
{
    if scheduler.beacon(time, out)? == Disposition::DeadTime {
        observer.on_beacon_dropped(scheduler.sensor(), &time);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::TriggerType;
    use proptest::prelude::*;

    #[derive(Clone, Debug, Default)]
    struct TestObserver {
        triggers: Vec<Trigger<i64>>,
        annotated: Vec<AnnotatedTrigger<i64>>,
        merged: Vec<AnnotatedTrigger<i64>>,
        dead_time: Vec<AnnotatedTrigger<i64>>,
        held: Vec<AnnotatedTrigger<i64>>,
        beacons_dropped: Vec<(DomId, i64)>,
        deferred: Vec<DomId>,
        launches: Vec<LaunchRecord<i64>>,
    }

    impl Observer for TestObserver {
        type Time = i64;

        fn on_trigger(&mut self, trigger: &Trigger<Self::Time>) {
            self.triggers.push(*trigger);
        }

        fn on_annotated(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {
            self.annotated.push(*trigger);
        }

        fn on_merge(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {
            self.merged.push(*trigger);
        }

        fn on_dead_time(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {
            self.dead_time.push(*trigger);
        }

        fn on_held(&mut self, trigger: &AnnotatedTrigger<Self::Time>) {
            self.held.push(*trigger);
        }

        fn on_beacon_dropped(&mut self, sensor: DomId, time: &Self::Time) {
            self.beacons_dropped.push((sensor, *time));
        }

        fn on_deferred(&mut self, sensor: DomId) {
            self.deferred.push(sensor);
        }

        fn on_launch(&mut self, launch: &LaunchRecord<Self::Time>) {
            self.launches.push(launch.clone());
        }
    }

    const A: DomId = DomId::new(47, 1);
    const B: DomId = DomId::new(47, 2);
    const C: DomId = DomId::new(47, 15);
    const D: DomId = DomId::new(47, 25);
    const E: DomId = DomId::new(47, 26);

    fn graph() -> NeighborGraph {
        NeighborGraph::with_lc_span([A, B, C, D, E], 2)
    }

    fn launcher_with(
        graph: NeighborGraph,
        merge: i64,
        multi_frame_mode: bool,
    ) -> Launcher<i64, TestObserver> {
        Launcher::builder()
            .graph(graph)
            .discriminator_threshold(0.25)
            .discriminator_deadtime(Positive::new(100).unwrap())
            .lc_window(Positive::new(1000).unwrap())
            .launch_merge_window(Positive::new(merge).unwrap())
            .launch_deadtime(Positive::new(6400).unwrap())
            .multi_frame_mode(multi_frame_mode)
            .observer(TestObserver::default())
            .build()
            .unwrap()
    }

    fn launcher(multi_frame_mode: bool) -> Launcher<i64, TestObserver> {
        launcher_with(graph(), 1000, multi_frame_mode)
    }

    fn pulses(times: &[i64]) -> Vec<Pulse<i64>> {
        times.iter().map(|&t| Pulse::new(t, 10.0)).collect()
    }

    fn run_frame(
        launcher: &mut Launcher<i64, TestObserver>,
        input: &[(DomId, &[i64])],
        force: bool,
    ) -> LaunchMap<i64> {
        for (dom, times) in input {
            launcher.submit_pulses(*dom, pulses(times)).unwrap();
        }
        launcher.finalize_frame(force).unwrap()
    }

    fn summary(map: &LaunchMap<i64>, dom: DomId) -> Vec<(i64, bool)> {
        map.get(&dom)
            .unwrap_or_default()
            .iter()
            .map(|l| (l.capture_start_time, l.lc_bit))
            .collect()
    }

    #[test]
    fn launcher_rejects_bad_threshold() {
        for threshold in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Launcher::builder()
                .graph(graph())
                .discriminator_threshold(threshold)
                .discriminator_deadtime(Positive::new(100).unwrap())
                .lc_window(Positive::new(1000).unwrap())
                .launch_merge_window(Positive::new(1000).unwrap())
                .launch_deadtime(Positive::new(6400).unwrap())
                .observer(NullObserver::<i64>::default())
                .build();
            assert!(matches!(result, Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn launcher_config() {
        let launcher = launcher(true);
        let config = launcher.config();
        assert_eq!(config.discriminator_threshold(), 0.25);
        assert_eq!(config.discriminator_window(), None);
        assert_eq!(config.lc_window().into_inner(), 1000);
        assert!(config.multi_frame_mode());
        assert_eq!(launcher.graph().len(), 5);
    }

    #[test]
    fn launcher_submit_errors() {
        let mut launcher = launcher(false);

        assert_eq!(
            launcher.submit_pulses(DomId::new(1, 1), pulses(&[0])),
            Err(Error::UnknownSensor(DomId::new(1, 1)))
        );
        assert_eq!(
            launcher.submit_pulses(A, pulses(&[10, 5])),
            Err(Error::InputOrder {
                sensor: A,
                index: 1
            })
        );
        assert_eq!(
            launcher.submit_pulses(A, [Pulse::new(0, 1.0), Pulse::new(1, -1.0)]),
            Err(Error::InvalidCharge {
                sensor: A,
                index: 1,
                charge: -1.0
            })
        );
        assert_eq!(launcher.submit_pulses(A, []), Ok(0));

        // Nothing of the rejected series was queued.
        assert!(launcher.finalize_frame(true).unwrap().is_empty());
    }

    #[test]
    fn launcher_order_across_frames() {
        let mut launcher = launcher(true);
        run_frame(&mut launcher, &[(A, &[1000])], false);

        launcher.reset(false);
        assert_eq!(
            launcher.submit_pulses(A, pulses(&[500])),
            Err(Error::InputOrder {
                sensor: A,
                index: 0
            })
        );

        launcher.reset(true);
        assert_eq!(launcher.submit_pulses(A, pulses(&[500])), Ok(1));
    }

    #[test]
    fn launcher_slc_pair() {
        let mut launcher = launcher_with(NeighborGraph::from([(A, B)]), 1000, false);

        let first = run_frame(&mut launcher, &[(A, &[0]), (B, &[1025])], false);
        assert_eq!(summary(&first, A), vec![(0, false)]);
        assert_eq!(summary(&first, B), vec![(1025, false)]);

        launcher.reset(true);
        let second = run_frame(&mut launcher, &[(A, &[0]), (B, &[1025])], false);
        assert_eq!(first, second);
    }

    #[test]
    fn launcher_hlc_pair() {
        let mut launcher = launcher_with(NeighborGraph::from([(A, B)]), 1000, false);

        let map = run_frame(&mut launcher, &[(A, &[0]), (B, &[800])], false);
        assert_eq!(summary(&map, A), vec![(0, true)]);
        assert_eq!(summary(&map, B), vec![(800, true)]);
    }

    #[test]
    fn launcher_slc_pair_multi_frame() {
        let mut launcher = launcher_with(NeighborGraph::from([(A, B)]), 1000, true);

        let map = run_frame(&mut launcher, &[(A, &[0]), (B, &[1025])], false);
        // The window of A has elapsed by the end of the frame, the one of B
        // has not.
        assert_eq!(summary(&map, A), vec![(0, false)]);
        assert!(!map.contains_key(&B));
        assert_eq!(launcher.pending_launches(), 1);
        assert_eq!(launcher.observer().deferred, vec![B]);

        let map = launcher.finalize_frame(true).unwrap();
        assert_eq!(summary(&map, B), vec![(1025, false)]);
        assert_eq!(launcher.pending_launches(), 0);
    }

    #[test]
    fn launcher_multi_frame_reference() {
        let mut launcher = launcher(true);

        let frame1 = run_frame(
            &mut launcher,
            &[
                (A, &[0, 29000]),
                (B, &[0, 29000]),
                (C, &[0, 29000]),
                (D, &[0, 29000]),
            ],
            false,
        );
        for dom in [A, B] {
            let launches = summary(&frame1, dom);
            assert_eq!(launches.len(), 2);
            assert!(launches[0].1);
        }
        for dom in [C, D] {
            assert_eq!(summary(&frame1, dom), vec![(0, false)]);
        }
        assert!(!frame1.contains_key(&E));
        assert_eq!(launcher.pending_launches(), 2);

        launcher.reset(false);
        let frame2 = run_frame(
            &mut launcher,
            &[
                (A, &[58000, 87000]),
                (B, &[58000, 87000]),
                (C, &[58000, 87000]),
                (E, &[29200]),
            ],
            false,
        );
        for dom in [A, B] {
            let launches = summary(&frame2, dom);
            assert_eq!(launches.len(), 2);
            assert!(launches[0].1);
        }
        assert_eq!(summary(&frame2, C), vec![(29000, false), (58000, false)]);
        // Carried over launch picks up the coincidence from the new frame.
        assert_eq!(summary(&frame2, D), vec![(29000, true)]);
        assert_eq!(summary(&frame2, E), vec![(29200, true)]);
        assert_eq!(launcher.pending_launches(), 1);
    }

    #[test]
    fn launcher_multi_frame_merge() {
        let mut launcher = launcher_with(graph(), 60000, true);

        let frame1 = run_frame(&mut launcher, &[(A, &[0])], false);
        assert!(frame1.is_empty());

        launcher.reset(false);
        let frame2 = run_frame(&mut launcher, &[(A, &[58000]), (B, &[58000])], false);
        let launches = frame2.get(&A).unwrap();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].capture_start_time, 0);
        assert_eq!(launches[0].trigger_times, vec![0, 58000]);
        assert!(launches[0].lc_bit);
        assert_eq!(summary(&frame2, B), vec![(58000, true)]);
        assert_eq!(launcher.observer().merged.len(), 1);
    }

    #[test]
    fn launcher_single_frame_never_defers() {
        let mut launcher = launcher(false);
        let map = run_frame(&mut launcher, &[(C, &[0])], false);
        assert_eq!(summary(&map, C), vec![(0, false)]);
        assert_eq!(launcher.pending_launches(), 0);
    }

    #[test]
    fn launcher_held_triggers_become_history() {
        let mut launcher = launcher(true);
        let frame1 = run_frame(&mut launcher, &[(A, &[0, 2000])], false);
        assert_eq!(summary(&frame1, A), vec![(0, false)]);
        assert_eq!(launcher.observer().held.len(), 1);

        launcher.reset(false);
        let frame2 = run_frame(&mut launcher, &[(B, &[2500])], false);
        assert_eq!(summary(&frame2, B), vec![(2500, true)]);
    }

    #[test]
    fn launcher_dead_time_triggers_dropped() {
        let mut launcher = launcher(false);
        run_frame(&mut launcher, &[(A, &[0, 2000])], false);
        assert!(launcher.observer().held.is_empty());
        assert_eq!(launcher.observer().dead_time.len(), 1);

        launcher.reset(false);
        let frame2 = run_frame(&mut launcher, &[(B, &[2500])], false);
        assert_eq!(summary(&frame2, B), vec![(2500, false)]);
    }

    #[test]
    fn launcher_launched_triggers_become_history() {
        let mut launcher = launcher_with(graph(), 200, true);
        let frame1 = run_frame(&mut launcher, &[(A, &[0]), (C, &[500])], false);
        assert_eq!(summary(&frame1, A), vec![(0, false)]);

        launcher.reset(false);
        let frame2 = run_frame(&mut launcher, &[(B, &[600])], false);
        assert_eq!(summary(&frame2, B), vec![(600, true)]);
        // The emitted launch of A keeps its bit.
        assert_eq!(launcher.pending_launches(), 1);
    }

    #[test]
    fn launcher_deadtime_outlives_frame_end() {
        let mut launcher = launcher(false);
        let frame1 = run_frame(&mut launcher, &[(A, &[0]), (C, &[50000])], true);
        assert_eq!(summary(&frame1, A), vec![(0, false)]);

        // A is behind the end of the frame and still in its launch deadtime.
        launcher.reset(false);
        assert_eq!(launcher.submit_pulses(A, pulses(&[10])), Ok(1));
        let frame2 = launcher.finalize_frame(true).unwrap();
        assert!(frame2.is_empty());
        assert_eq!(launcher.observer().dead_time.len(), 1);

        launcher.reset(false);
        let frame3 = run_frame(&mut launcher, &[(A, &[7400])], true);
        assert_eq!(summary(&frame3, A), vec![(7400, false)]);
    }

    #[test]
    fn launcher_observer() {
        let mut launcher = launcher(false);
        run_frame(&mut launcher, &[(A, &[0, 300]), (B, &[200])], false);

        let observer = launcher.into_observer();
        assert_eq!(observer.triggers.len(), 3);
        assert_eq!(observer.annotated.len(), 3);
        assert!(observer.annotated.iter().all(|t| t.lc_bit));
        assert_eq!(
            observer.merged,
            vec![AnnotatedTrigger {
                sensor: A,
                time: 300,
                lc_bit: true
            }]
        );
        assert_eq!(observer.launches.len(), 2);
        assert!(observer.deferred.is_empty());
    }

    #[test]
    fn launcher_beacons() {
        let mut launcher = launcher(false);
        launcher.submit_pulses(A, pulses(&[5000])).unwrap();
        launcher.submit_beacons(A, [0, 5000, 20000]).unwrap();
        let map = launcher.finalize_frame(false).unwrap();

        let launches = map.get(&A).unwrap();
        assert_eq!(
            launches
                .iter()
                .map(|l| (l.capture_start_time, l.lc_bit, l.trigger_type))
                .collect::<Vec<_>>(),
            vec![
                (0, false, TriggerType::CpuRequested),
                (20000, false, TriggerType::CpuRequested)
            ]
        );
        assert_eq!(launcher.observer().dead_time.len(), 1);
        assert_eq!(launcher.observer().beacons_dropped, vec![(A, 5000)]);
    }

    #[test]
    fn launcher_beacon_tie_trigger_first() {
        let mut launcher = launcher(false);
        launcher.submit_pulses(C, pulses(&[1000])).unwrap();
        launcher.submit_beacons(C, [1000]).unwrap();
        let map = launcher.finalize_frame(false).unwrap();

        let launches = map.get(&C).unwrap();
        assert_eq!(launches.len(), 1);
        assert_eq!(launches[0].trigger_type, TriggerType::SpeDiscriminator);
        assert_eq!(launcher.observer().beacons_dropped, vec![(C, 1000)]);
    }

    #[test]
    fn launcher_beacon_errors() {
        let mut launcher = launcher(false);
        assert_eq!(
            launcher.submit_beacons(A, [10, 5]),
            Err(Error::InputOrder {
                sensor: A,
                index: 1
            })
        );
        assert_eq!(
            launcher.submit_beacons(DomId::new(1, 1), [10]),
            Err(Error::UnknownSensor(DomId::new(1, 1)))
        );
    }

    #[test]
    fn launcher_reset_idempotent() {
        let frame1: &[(DomId, &[i64])] = &[(A, &[0, 2000]), (D, &[0])];
        let frame2: &[(DomId, &[i64])] = &[(B, &[2500]), (D, &[500]), (E, &[700])];

        for hard in [false, true] {
            let mut once = launcher(true);
            run_frame(&mut once, frame1, false);
            let mut twice = once.clone();

            once.reset(hard);
            twice.reset(hard);
            twice.reset(hard);
            assert_eq!(once.pending_launches(), twice.pending_launches());

            let a = run_frame(&mut once, frame2, false);
            let b = run_frame(&mut twice, frame2, false);
            assert_eq!(a, b);
            assert_eq!(once.pending_launches(), twice.pending_launches());
        }
    }

    #[test]
    fn launcher_hard_reset_drops_pending() {
        let mut launcher = launcher(true);
        run_frame(&mut launcher, &[(C, &[0])], false);
        assert_eq!(launcher.pending_launches(), 1);

        launcher.reset(true);
        assert_eq!(launcher.pending_launches(), 0);
        assert!(launcher.finalize_frame(true).unwrap().is_empty());
    }

    #[test]
    fn launcher_uom_time() {
        use uom::si::f64::Time;
        use uom::si::time::nanosecond;

        let ns = |value: f64| Time::new::<nanosecond>(value);
        let mut launcher = Launcher::builder()
            .graph(NeighborGraph::from([(A, B)]))
            .discriminator_threshold(0.25)
            .discriminator_deadtime(Positive::new(ns(100.0)).unwrap())
            .lc_window(Positive::new(ns(1000.0)).unwrap())
            .launch_merge_window(Positive::new(ns(1000.0)).unwrap())
            .launch_deadtime(Positive::new(ns(6400.0)).unwrap())
            .observer(NullObserver::<Time>::default())
            .build()
            .unwrap();

        launcher
            .submit_pulses(A, [Pulse::new(ns(0.0), 1.0)])
            .unwrap();
        launcher
            .submit_pulses(B, [Pulse::new(ns(800.0), 1.0), Pulse::new(ns(9000.0), 1.0)])
            .unwrap();
        let map = launcher.finalize_frame(true).unwrap();

        assert!(map.get(&A).unwrap()[0].lc_bit);
        let b = map.get(&B).unwrap();
        assert_eq!(b.len(), 2);
        assert!(b[0].lc_bit);
        assert!(!b[1].lc_bit);
    }

    fn times() -> impl Strategy<Value = Vec<i64>> {
        prop::collection::vec(0i64..50_000, 0..40).prop_map(|mut v| {
            v.sort_unstable();
            v
        })
    }

    proptest! {
        #[test]
        fn prop_replay_after_hard_reset(
            a in times(),
            b in times(),
            d in times(),
            multi_frame_mode in any::<bool>(),
        ) {
            let input: &[(DomId, &[i64])] = &[(A, &a), (B, &b), (D, &d)];
            let mut launcher = launcher(multi_frame_mode);

            let first = run_frame(&mut launcher, input, false);
            launcher.reset(true);
            let second = run_frame(&mut launcher, input, false);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_force_flush_completeness(
            a in times(),
            b in times(),
            c in times(),
            multi_frame_mode in any::<bool>(),
        ) {
            let input: &[(DomId, &[i64])] = &[(A, &a), (B, &b), (C, &c)];
            let mut launcher = launcher(multi_frame_mode);

            let map = run_frame(&mut launcher, input, true);
            prop_assert_eq!(launcher.pending_launches(), 0);

            // Every trigger ends up in exactly one launch, or was stopped by
            // the launch deadtime.
            let observer = launcher.observer();
            let launched: usize = map
                .iter()
                .flat_map(|(_, series)| series)
                .map(|l| l.trigger_times.len())
                .sum();
            prop_assert_eq!(
                launched + observer.dead_time.len() + observer.held.len(),
                observer.triggers.len()
            );
            for (_, series) in &map {
                for w in series.windows(2) {
                    prop_assert!(w[1].capture_start_time >= w[0].capture_start_time + 1000 + 6400);
                }
            }
        }
    }
}
