/// A single string of DOMs with dark noise and beacon launches, crossed by a
/// muon in one of the frames. Frames are processed in multi-frame mode, like
/// a long event split into consecutive time windows.
///
/// Run with `RUST_LOG=domlauncher=debug` to follow the frames.
use anyhow::{Context, Result};
use domlauncher::gen::{beacon_times, DarkNoise};
use domlauncher::graph::NeighborGraph;
use domlauncher::launch::TriggerType;
use domlauncher::signals::{AnnotatedTrigger, DomId, Positive, Pulse, Trigger};
use domlauncher::{Launcher, Observer};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Normal;
use tracing_subscriber::EnvFilter;
use uom::si::f64::{Frequency, Time};
use uom::si::{
    frequency::hertz,
    time::{microsecond, nanosecond},
};

#[derive(Debug, Default)]
struct Counter {
    triggers: usize,
    dead_time: usize,
    held: usize,
    beacons_dropped: usize,
}

impl Observer for Counter {
    type Time = Time;

    fn on_trigger(&mut self, _: &Trigger<Self::Time>) {
        self.triggers += 1;
    }

    fn on_dead_time(&mut self, _: &AnnotatedTrigger<Self::Time>) {
        self.dead_time += 1;
    }

    fn on_held(&mut self, _: &AnnotatedTrigger<Self::Time>) {
        self.held += 1;
    }

    fn on_beacon_dropped(&mut self, _: DomId, _: &Self::Time) {
        self.beacons_dropped += 1;
    }
}

fn positive(value: Time) -> Result<Positive<Time>> {
    Positive::new(value).context("durations must be positive")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // ===========================================
    // These are most likely your free parameters:
    let frames = 20;
    let frame_length = Time::new::<microsecond>(100.0);
    let noise_rate = Frequency::new::<hertz>(800.0);
    let beacon_rate = Frequency::new::<hertz>(5000.0);
    let muon_frame = 7;
    // ===========================================

    // ===========================================
    // Then, this is the DOM configuration:
    let doms: Vec<_> = (1..=60).map(|om| DomId::new(47, om)).collect();
    let spe_charge = Normal::new(1.0, 0.3)?;
    let mut launcher = Launcher::builder()
        .graph(NeighborGraph::with_lc_span(doms.iter().copied(), 2))
        .discriminator_threshold(0.25)
        .discriminator_deadtime(positive(Time::new::<nanosecond>(100.0))?)
        .lc_window(positive(Time::new::<nanosecond>(1000.0))?)
        .launch_merge_window(positive(Time::new::<nanosecond>(6400.0))?)
        .launch_deadtime(positive(Time::new::<nanosecond>(6400.0))?)
        .multi_frame_mode(true)
        .observer(Counter::default())
        .build()?;
    // ===========================================

    let mut rng = StdRng::seed_from_u64(42);
    let (mut hlc, mut slc, mut beacons) = (0, 0, 0);
    for frame in 0..frames {
        let start = frame_length * f64::from(frame);
        let end = start + frame_length;

        for &dom in &doms {
            let mut pulses: Vec<_> =
                DarkNoise::new(noise_rate, start, spe_charge, StdRng::from_rng(&mut rng))?
                    .take_while(|p| p.time < end)
                    .collect();
            if frame == muon_frame && (20..=40).contains(&dom.om) {
                let time = start
                    + Time::new::<microsecond>(50.0)
                    + Time::new::<nanosecond>(57.0) * f64::from(dom.om - 20);
                pulses.push(Pulse::new(time, 5.0));
                pulses.sort_by(|a, b| a.time.value.total_cmp(&b.time.value));
            }
            launcher.submit_pulses(dom, pulses)?;
            launcher.submit_beacons(dom, beacon_times(beacon_rate, start, end, &mut rng)?)?;
        }

        let launches = launcher.finalize_frame(frame + 1 == frames)?;
        for (_, series) in &launches {
            for launch in series {
                match (launch.trigger_type, launch.lc_bit) {
                    (TriggerType::CpuRequested, _) => beacons += 1,
                    (TriggerType::SpeDiscriminator, true) => hlc += 1,
                    (TriggerType::SpeDiscriminator, false) => slc += 1,
                }
            }
        }
        println!(
            "frame {frame:>2}: {:>3} launches on {:>2} DOMs, {} pending",
            launches.total_launches(),
            launches.len(),
            launcher.pending_launches()
        );
        launcher.reset(false);
    }

    let counter = launcher.into_observer();
    println!("HLC launches: {hlc}");
    println!("SLC launches: {slc}");
    println!("Beacon launches: {beacons} ({} dropped)", counter.beacons_dropped);
    println!(
        "Triggers: {} ({} dropped and {} held by the launch deadtime)",
        counter.triggers, counter.dead_time, counter.held
    );

    Ok(())
}
