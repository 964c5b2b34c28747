//! Value-or-failure carrier shared by promises and channel buffers.
//!
//! [`Outcome`] is the single completion notion in this crate: promises
//! settle with one, and channels convert buffered elements into one at
//! delivery time. Keeping it independent of the promise type lets a channel
//! buffer naked values and still attach a failure at close time.

use core::fmt;

use crate::error::{EmptyFailure, Failure};

/// The result of an asynchronous operation: a value or a failure.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The operation produced a value.
    Value(T),
    /// The operation failed with a (non-empty) failure token.
    Failed(Failure),
}

impl<T> Outcome<T> {
    /// Wraps a value. Never fails.
    pub const fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wraps a failure token.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyFailure`] if the token carries no error; an outcome
    /// must never claim failure without one.
    pub fn failed(failure: Failure) -> Result<Self, EmptyFailure> {
        if failure.is_empty() {
            return Err(EmptyFailure);
        }
        Ok(Self::Failed(failure))
    }

    /// Returns true if this outcome holds a value.
    #[must_use]
    pub const fn is_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Returns true if this outcome holds a failure.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Borrows the failure token, if any.
    #[must_use]
    pub const fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Value(_) => None,
            Self::Failed(failure) => Some(failure),
        }
    }

    /// Moves the value out, or surrenders the failure to the caller.
    ///
    /// # Errors
    ///
    /// Returns the carried failure token if the outcome is a failure.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Failed(failure) => Err(failure),
        }
    }

    /// Maps the value side, leaving failures untouched.
    pub fn map<U, F>(self, f: F) -> Outcome<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Value(value) => Outcome::Value(f(value)),
            Self::Failed(failure) => Outcome::Failed(failure),
        }
    }
}

impl<T> From<Result<T, Failure>> for Outcome<T> {
    fn from(result: Result<T, Failure>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(failure) => Self::Failed(failure.or_invalid()),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "value: {value}"),
            Self::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelClosed;

    #[test]
    fn value_side_round_trips() {
        crate::test_utils::init_test_logging();
        let outcome = Outcome::value(17);
        crate::assert_with_log!(outcome.is_value(), "is_value", true, outcome.is_value());
        let extracted = outcome.into_result();
        crate::assert_with_log!(
            matches!(extracted, Ok(17)),
            "into_result",
            17,
            extracted
        );
    }

    #[test]
    fn failed_requires_non_empty_token() {
        crate::test_utils::init_test_logging();
        let rejected = Outcome::<i32>::failed(Failure::empty());
        crate::assert_with_log!(
            rejected.is_err(),
            "empty token refused",
            true,
            rejected.is_err()
        );

        let outcome = Outcome::<i32>::failed(Failure::closed()).expect("non-empty token");
        crate::assert_with_log!(outcome.is_failed(), "is_failed", true, outcome.is_failed());
        let failure = outcome.into_result().unwrap_err();
        crate::assert_with_log!(
            failure.is::<ChannelClosed>(),
            "token preserved",
            true,
            failure.is::<ChannelClosed>()
        );
    }

    #[test]
    fn map_touches_only_values() {
        crate::test_utils::init_test_logging();
        let doubled = Outcome::value(21).map(|v| v * 2);
        let value = doubled.into_result().expect("value");
        crate::assert_with_log!(value == 42, "mapped value", 42, value);

        let failed = Outcome::<i32>::failed(Failure::closed())
            .expect("token")
            .map(|v| v * 2);
        crate::assert_with_log!(failed.is_failed(), "failure untouched", true, failed.is_failed());
    }
}
