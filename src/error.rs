use crate::signals::DomId;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the launch simulation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Error {
    /// Pulses for a DOM were not supplied in non-decreasing time order.
    ///
    /// `index` is the position of the offending pulse in the submitted
    /// sequence.
    #[error("pulse {index} on DOM {sensor} is earlier than the pulse before it")]
    InputOrder { sensor: DomId, index: usize },
    /// A pulse has non-positive or non-finite charge.
    #[error("pulse {index} on DOM {sensor} has invalid charge {charge} PE")]
    InvalidCharge {
        sensor: DomId,
        index: usize,
        charge: f64,
    },
    /// The DOM is not part of the configured geometry.
    #[error("DOM {0} is not part of the configured geometry")]
    UnknownSensor(DomId),
    /// An internal invariant was violated. The simulation output can not be
    /// trusted after this error.
    #[error("internal state of DOM {sensor} is corrupted: {reason}")]
    StateCorruption { sensor: DomId, reason: &'static str },
    /// A configuration option was rejected at construction.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
