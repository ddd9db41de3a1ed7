//! # Signature Counter Policy
//!
//! Authenticators keep a counter that goes up on every signature. If we ever
//! see a value that is not ahead of the one we stored, two copies of the same
//! private key are probably in circulation (a cloned authenticator).
//!
//! Some authenticators never increment and always report 0. A stored value
//! of 0 therefore accepts anything, which bootstraps those devices; once a
//! non-zero value has been stored, every new value must be strictly greater.

use thiserror::Error;

/// A reported counter that would move the stored counter backwards (or not at all)
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("signature counter regression: stored {stored}, reported {reported}")]
pub struct CounterRegression {
    pub stored: u32,
    pub reported: u32,
}

/// Decide whether `reported` may replace `stored`
///
/// Returns the counter value to persist on success.
pub fn check(stored: u32, reported: u32) -> Result<u32, CounterRegression> {
    if stored == 0 || reported > stored {
        Ok(reported)
    } else {
        Err(CounterRegression { stored, reported })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_stays_zero_for_non_incrementing_authenticators() {
        assert_eq!(check(0, 0), Ok(0));
    }

    #[test]
    fn zero_accepts_first_real_value() {
        assert_eq!(check(0, 5), Ok(5));
    }

    #[test]
    fn equal_value_is_rejected_once_non_zero() {
        assert_eq!(
            check(5, 5),
            Err(CounterRegression {
                stored: 5,
                reported: 5
            })
        );
    }

    #[test]
    fn strictly_greater_is_accepted() {
        assert_eq!(check(5, 6), Ok(6));
    }

    #[test]
    fn lower_value_is_rejected() {
        assert_eq!(
            check(5, 3),
            Err(CounterRegression {
                stored: 5,
                reported: 3
            })
        );
    }

    #[test]
    fn falling_back_to_zero_is_rejected() {
        // An authenticator that used to count cannot start reporting 0.
        assert!(check(7, 0).is_err());
    }
}
