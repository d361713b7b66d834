use thiserror::Error;

/// Errors raised while validating user supplied search input.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Please enter both latitude and longitude separated by a comma")]
    MissingSeparator,

    #[error("Expected exactly 'latitude, longitude' but found {0} comma-separated values")]
    TooManyParts(usize),

    #[error("Invalid {field} '{value}': not a number")]
    InvalidNumber { field: &'static str, value: String },

    #[error("{field} {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid search radius {0}: must be a finite number greater than zero")]
    InvalidRadius(f64),

    #[error("Unknown distance unit '{0}' (expected 'mi' or 'km')")]
    UnknownUnit(String),
}
