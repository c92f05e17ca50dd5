use num_traits::Zero;
use std::fmt;

/// Identity of a single DOM: the string it hangs on and its position along
/// that string.
///
/// DOMs are ordered by string first, then position.
///
/// # Examples
///
/// ```
/// use domlauncher::signals::DomId;
///
/// let dom = DomId::new(47, 2);
/// assert_eq!(dom.to_string(), "47-2");
/// assert!(dom < DomId::new(47, 3));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DomId {
    pub string: i32,
    pub om: u32,
}

impl DomId {
    pub const fn new(string: i32, om: u32) -> Self {
        Self { string, om }
    }
}

impl fmt::Display for DomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.string, self.om)
    }
}

/// A strictly positive value, typically a duration.
///
/// # Examples
///
/// ```
/// use domlauncher::signals::Positive;
///
/// assert!(Positive::new(25.0).is_some());
/// assert!(Positive::new(0).is_none());
/// assert!(Positive::new(f64::NAN).is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Positive<T>(T);

impl<T: Zero + PartialOrd> Positive<T> {
    /// Returns `None` unless `value` is greater than zero.
    pub fn new(value: T) -> Option<Self> {
        (value > T::zero()).then_some(Self(value))
    }
}

impl<T> Positive<T> {
    pub fn inner(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

/// A [`Pulse`] is the charge collected by the PMT of a DOM at a given time.
/// These are the input to the discriminator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pulse<T> {
    pub time: T,
    /// Charge in units of photoelectrons (PE).
    pub charge: f64,
}

impl<T> Pulse<T> {
    pub fn new(time: T, charge: f64) -> Self {
        Self { time, charge }
    }
}

/// A discriminator threshold crossing on a DOM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trigger<T> {
    pub sensor: DomId,
    pub time: T,
}

/// A [`Trigger`] together with its local coincidence decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotatedTrigger<T> {
    pub sensor: DomId,
    pub time: T,
    /// Whether a neighbor triggered within the LC window.
    pub lc_bit: bool,
}

impl<T> Trigger<T> {
    pub fn annotate(self, lc_bit: bool) -> AnnotatedTrigger<T> {
        AnnotatedTrigger {
            sensor: self.sensor,
            time: self.time,
            lc_bit,
        }
    }
}
