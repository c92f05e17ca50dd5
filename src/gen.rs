use crate::error::{Error, Result};
use crate::signals::{Positive, Pulse};
use crate::statistics::PoissonProcess;
use rand::{Rng, SeedableRng};
use rand_distr::Distribution;
use std::iter::Repeat;
use std::ops::Add;
use uom::si::f64::{Frequency, Time};
use uom::si::frequency::hertz;
use uom::si::time::{nanosecond, second};

/// Period of the DOM clock. Beacon launches are aligned to it.
pub const CLOCK_CYCLE_NS: f64 = 25.0;

// A distribution that keeps returning non-positive charges is treated as
// exhausted after this many draws in a row.
const MAX_REDRAWS: usize = 1000;

/// A deterministic series of pulses.
///
/// Each step is a `(charge, gap)` pair: a pulse of `charge` PE at the current
/// time, after which time moves forward by `gap`.
///
/// # Examples
///
/// ```
/// use domlauncher::gen::PulseTrain;
/// use domlauncher::signals::Positive;
///
/// let train: Vec<_> = PulseTrain::regular(100, Positive::new(30).unwrap(), 2.0)
///     .until(200)
///     .map(|p| p.time)
///     .collect();
/// assert_eq!(train, vec![100, 130, 160, 190]);
/// ```
#[derive(Clone, Debug)]
pub struct PulseTrain<T, I> {
    next: Option<T>,
    steps: I,
    end: Option<T>,
}

impl<T: Copy> PulseTrain<T, Repeat<(f64, T)>> {
    /// Endless train of identical pulses, one every `period` starting at
    /// `start`.
    pub fn regular(start: T, period: Positive<T>, charge: f64) -> Self {
        Self::new(start, std::iter::repeat((charge, period.into_inner())))
    }
}

impl<T, I> PulseTrain<T, I>
where
    I: Iterator<Item = (f64, T)>,
{
    pub fn new<S>(start: T, steps: S) -> Self
    where
        S: IntoIterator<IntoIter = I>,
    {
        Self {
            next: Some(start),
            steps: steps.into_iter(),
            end: None,
        }
    }

    /// Stops the train before `end` (exclusive).
    pub fn until(mut self, end: T) -> Self {
        self.end = Some(end);
        self
    }
}

impl<T, I> Iterator for PulseTrain<T, I>
where
    T: Add<Output = T> + PartialOrd + Copy,
    I: Iterator<Item = (f64, T)>,
{
    type Item = Pulse<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.next?;
        if self.end.is_some_and(|end| time >= end) {
            self.next = None;
            return None;
        }
        let Some((charge, gap)) = self.steps.next() else {
            self.next = None;
            return None;
        };
        self.next = Some(time + gap);

        Some(Pulse::new(time, charge))
    }
}

/// PMT dark noise: pulses at Poisson distributed times with charges drawn
/// from `D` (e.g. a normal distribution around 1 PE).
///
/// Non-positive charge draws are drawn again, so every pulse is valid input
/// for a [`PulseQueue`](crate::queue::PulseQueue).
#[derive(Debug)]
pub struct DarkNoise<R, D> {
    times: PoissonProcess<R>,
    charge: D,
    rng: R,
}

impl<R, D> DarkNoise<R, D>
where
    R: Rng + SeedableRng,
    D: Distribution<f64>,
{
    /// The arrival times and the charges use independent streams, both
    /// seeded from `rng`.
    pub fn new(rate: Frequency, origin: Time, charge: D, mut rng: R) -> Result<Self> {
        let times = PoissonProcess::new(rate, origin, R::from_rng(&mut rng))?;

        Ok(Self { times, charge, rng })
    }
}

impl<R, D> Iterator for DarkNoise<R, D>
where
    R: Rng,
    D: Distribution<f64>,
{
    type Item = Pulse<Time>;

    fn next(&mut self) -> Option<Self::Item> {
        let time = self.times.next()?;
        let charge = (0..MAX_REDRAWS)
            .map(|_| self.charge.sample(&mut self.rng))
            .find(|q| q.is_finite() && *q > 0.0)?;

        Some(Pulse::new(time, charge))
    }
}

/// Times of the CPU requested (beacon) launches of a DOM within
/// `[start, end)`.
///
/// Beacons repeat with period `1 / rate` and a random phase that is aligned
/// to the DOM clock.
pub fn beacon_times<R: Rng>(
    rate: Frequency,
    start: Time,
    end: Time,
    rng: &mut R,
) -> Result<Vec<Time>> {
    let rate = rate.get::<hertz>();
    if !(rate > 0.0 && rate.is_finite()) {
        return Err(Error::InvalidConfig(format!("invalid beacon rate {rate} Hz")));
    }
    let period = 1.0 / rate;
    let clock = Time::new::<nanosecond>(CLOCK_CYCLE_NS).get::<second>();
    let phase = (rng.random::<f64>() * period / clock).floor() * clock;

    let start = start.get::<second>();
    let end = end.get::<second>();
    let mut k = ((start - phase) / period).ceil();
    let mut times = Vec::new();
    loop {
        let t = phase + k * period;
        if t >= end {
            break;
        }
        times.push(Time::new::<second>(t));
        k += 1.0;
    }

    Ok(times)
}
