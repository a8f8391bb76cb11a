use thiserror::Error;

/// A parlay request rejected before any search runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("target multiplier must be a finite number greater than 1, got {target}")]
    TargetTooLow { target: f64 },

    #[error("tolerance must be strictly between 0 and 1, got {tolerance}")]
    ToleranceOutOfRange { tolerance: f64 },

    #[error("min_legs must be at least 1")]
    ZeroMinLegs,

    #[error("max_legs {max_legs} is below min_legs {min_legs}")]
    LegBoundsInverted { min_legs: usize, max_legs: usize },

    #[error("price range is invalid: min {min:?}, max {max:?}")]
    InvalidPriceRange { min: Option<f64>, max: Option<f64> },

    #[error("kickoff horizon ends before it starts")]
    InvalidHorizon,
}
