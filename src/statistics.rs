use crate::error::{Error, Result};
use rand::Rng;
use rand_distr::{Distribution, Exp};
use uom::si::f64::{Frequency, Time};
use uom::si::frequency::hertz;
use uom::si::time::second;

/// An iterator over the event times of a Poisson process.
///
/// Times are strictly increasing (after `origin`) and their inter-arrival
/// time follows an exponential distribution with the specified rate.
#[derive(Debug)]
pub struct PoissonProcess<R> {
    time: Time,
    // [`Time`] doesn't implement `num_traits::Float`, so inter-arrival times
    // are sampled as `f64` seconds and converted on the way out.
    exp: Exp<f64>,
    rng: R,
}

impl<R: Rng> PoissonProcess<R> {
    /// Creates a Poisson process with the given rate whose first event comes
    /// after `origin`.
    ///
    /// # Examples
    ///
    /// ```
    /// use domlauncher::statistics::PoissonProcess;
    /// use rand::{rngs::StdRng, SeedableRng};
    /// use uom::si::f64::{Frequency, Time};
    /// use uom::si::{frequency::kilohertz, time::second};
    ///
    /// let origin = Time::new::<second>(0.0);
    /// let rate = Frequency::new::<kilohertz>(1.0);
    /// let times: Vec<_> = PoissonProcess::new(rate, origin, StdRng::seed_from_u64(0))?
    ///     .take(10)
    ///     .collect();
    /// assert!(times.windows(2).all(|w| w[0] < w[1]));
    /// # Ok::<(), domlauncher::Error>(())
    /// ```
    pub fn new(rate: Frequency, origin: Time, rng: R) -> Result<Self> {
        let lambda = rate.get::<hertz>();
        let exp = Exp::new(lambda)
            .ok()
            .filter(|_| lambda > 0.0 && lambda.is_finite())
            .ok_or_else(|| Error::InvalidConfig(format!("invalid Poisson rate {lambda} Hz")))?;

        Ok(Self {
            time: origin,
            exp,
            rng,
        })
    }
}

impl<R: Rng> Iterator for PoissonProcess<R> {
    type Item = Time;

    fn next(&mut self) -> Option<Self::Item> {
        let delta_t = self.exp.sample(&mut self.rng);
        self.time += Time::new::<second>(delta_t);

        Some(self.time)
    }
}
