//! Error types and the type-erased failure token.
//!
//! Failures travel through promises and channels as [`Failure`] tokens:
//! cheaply clonable, type-erased handles that preserve the original error
//! type for typed `.fail()` handlers while always degrading to an untyped
//! handler. The concrete error types here are deliberately small; anything
//! application-specific is wrapped into a `Failure` at the boundary.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// The channel was closed before the operation could observe a value.
///
/// This is the normal terminal signal: consumers see it once the buffered
/// tail has drained, producers see it as a refused send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("channel is closed")]
pub struct ChannelClosed;

/// A promise resolver was dropped without settling its promise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("promise abandoned without being settled")]
pub struct BrokenPromise;

/// An empty [`Failure`] token was used where a real failure is required.
///
/// Building a failed outcome or rejecting a promise needs a token that
/// actually carries an error; an empty token is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("failure token carries no error")]
pub struct EmptyFailure;

/// An opaque, clonable, type-erased failure.
///
/// A `Failure` wraps any `std::error::Error` behind an `Arc`, so cloning is
/// cheap and the same failure can complete several promises (a terminal
/// channel error is observed by every subsequent receive). The original
/// type is recoverable via [`Failure::downcast_ref`], which is what typed
/// `.fail()` handlers are built on.
///
/// A token may be *empty* (see [`Failure::empty`]); empty tokens exist only
/// as placeholders and are rejected wherever a real failure is required.
#[derive(Clone)]
pub struct Failure {
    inner: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl Failure {
    /// Wraps a concrete error into a failure token.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            inner: Some(Arc::new(error)),
        }
    }

    /// Creates an empty token that carries no error.
    #[must_use]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// The canonical [`ChannelClosed`] token.
    #[must_use]
    pub fn closed() -> Self {
        Self::new(ChannelClosed)
    }

    /// Returns true if this token carries no error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    /// Returns true if the carried error is of type `E`.
    #[must_use]
    pub fn is<E>(&self) -> bool
    where
        E: StdError + Send + Sync + 'static,
    {
        self.downcast_ref::<E>().is_some()
    }

    /// Returns true if this token carries the normal-close signal.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.is::<ChannelClosed>()
    }

    /// Attempts to view the carried error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.inner
            .as_deref()
            .and_then(|error| error.downcast_ref::<E>())
    }

    /// Replaces an empty token with an [`EmptyFailure`] failure, so misuse
    /// surfaces as a typed error instead of silently carrying nothing.
    #[must_use]
    pub(crate) fn or_invalid(self) -> Self {
        if self.is_empty() {
            Self::new(EmptyFailure)
        } else {
            self
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(error) => fmt::Display::fmt(error, f),
            None => write!(f, "(empty failure)"),
        }
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(error) => f.debug_tuple("Failure").field(error).finish(),
            None => f.debug_tuple("Failure").finish(),
        }
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("test failure")]
    struct TestError;

    #[test]
    fn downcast_preserves_type() {
        crate::test_utils::init_test_logging();
        let failure = Failure::new(TestError);
        crate::assert_with_log!(
            failure.is::<TestError>(),
            "typed match",
            true,
            failure.is::<TestError>()
        );
        let wrong = failure.is::<ChannelClosed>();
        crate::assert_with_log!(!wrong, "non-matching type", false, wrong);
        let via_ref = failure.downcast_ref::<TestError>().copied();
        crate::assert_with_log!(
            via_ref == Some(TestError),
            "downcast_ref",
            Some(TestError),
            via_ref
        );
    }

    #[test]
    fn clones_share_the_error() {
        crate::test_utils::init_test_logging();
        let failure = Failure::new(TestError);
        let clone = failure.clone();
        crate::assert_with_log!(
            clone.is::<TestError>(),
            "clone matches",
            true,
            clone.is::<TestError>()
        );
        crate::assert_with_log!(
            clone.to_string() == failure.to_string(),
            "display identical",
            failure.to_string(),
            clone.to_string()
        );
    }

    #[test]
    fn closed_token_is_closed() {
        crate::test_utils::init_test_logging();
        let failure = Failure::closed();
        crate::assert_with_log!(failure.is_closed(), "is_closed", true, failure.is_closed());
        crate::assert_with_log!(!failure.is_empty(), "not empty", false, failure.is_empty());
    }

    #[test]
    fn empty_token_reports_empty() {
        crate::test_utils::init_test_logging();
        let failure = Failure::empty();
        crate::assert_with_log!(failure.is_empty(), "is_empty", true, failure.is_empty());
        let substituted = failure.or_invalid();
        crate::assert_with_log!(
            substituted.is::<EmptyFailure>(),
            "empty becomes EmptyFailure",
            true,
            substituted.is::<EmptyFailure>()
        );
    }
}
