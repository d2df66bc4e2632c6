//! Error types shared by the rate cache, conversion engine and sessions.

use crate::core::currency::Currency;
use thiserror::Error;

/// Errors produced by rate lookups, refreshes and conversion sessions.
///
/// `Clone` so a single refresh outcome can be handed to every caller that
/// joined the same in-flight refresh.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    /// Currency code outside the supported set.
    #[error("Unsupported currency code: {0}")]
    InvalidCurrency(String),

    /// No usable rate table exists.
    #[error("Exchange rates are not available")]
    RatesUnavailable,

    /// Every attempt of one refresh failed.
    #[error("Rate refresh failed after {attempts} attempt(s): {reason}")]
    RefreshFailed { attempts: usize, reason: String },

    /// Amount is not a number, not positive, or above the ceiling.
    #[error("Invalid amount '{input}': {reason}")]
    AmountOutOfRange { input: String, reason: String },

    /// Adding one more target would exceed the selection cap.
    #[error("At most {limit} target currencies can be selected")]
    TargetLimitExceeded { limit: usize },

    #[error("Target currency {0} is the same as the source currency")]
    SameAsSource(Currency),

    #[error("No target currencies selected")]
    NoTargetsSelected,

    /// Session operation invoked in a state that does not accept it.
    #[error("Cannot {operation} while session is {state}")]
    UnexpectedState {
        operation: &'static str,
        state: &'static str,
    },
}

pub type ConversionResult<T> = Result<T, ConversionError>;
