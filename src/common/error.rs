//! Error types for the expansion coordinator.

use thiserror::Error;

use crate::driver::DriverError;
use crate::store::StoreError;

/// Result type carrying [`ExpandError`].
pub type ExpandResult<T> = Result<T, ExpandError>;

/// Crate-wide error, one variant per failure seam, each carrying the context
/// trail accumulated on the way up.
#[derive(Error, Debug)]
pub enum ExpandError {
    /// Argument is invalid
    #[error("Argument is invalid, context is {:#?}", .context)]
    ArgumentInvalid {
        /// Context of the error
        context: Vec<String>,
    },

    /// Error returned by the claim store
    #[error("StoreErr, the error is {:?}, context is {:#?}", .source, .context)]
    StoreErr {
        /// Error source
        source: StoreError,
        /// Context of the error
        context: Vec<String>,
    },

    /// Error returned by the storage driver adapter
    #[error("DriverErr, the error is {:?}, context is {:#?}", .source, .context)]
    DriverErr {
        /// Error source
        source: DriverError,
        /// Context of the error
        context: Vec<String>,
    },

    /// Attempt cancelled by the caller
    #[error("Attempt cancelled, context is {:#?}", .context)]
    Cancelled {
        /// Context of the error
        context: Vec<String>,
    },
}

/// Retry class of an error, consumed by the operation executor to drive its
/// scheduling without inspecting error internals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry the whole attempt as-is.
    Transient,
    /// Stale version: re-read and re-evaluate, never retry the stale write.
    Conflict,
    /// Stop retrying on this node for now, without failing the consumer.
    PreconditionBlocked,
    /// No retry will help on this node.
    Terminal,
}

impl ErrorClass {
    /// Class name as a static string.
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "Transient",
            Self::Conflict => "Conflict",
            Self::PreconditionBlocked => "PreconditionBlocked",
            Self::Terminal => "Terminal",
        }
    }
}

impl ExpandError {
    /// Classifies this error for retry scheduling. The match is total over
    /// both seam enums, so a new driver or store variant cannot ship without
    /// deciding its class here.
    #[must_use]
    pub fn classify(&self) -> ErrorClass {
        match *self {
            Self::ArgumentInvalid { .. } => ErrorClass::Terminal,
            Self::Cancelled { .. } => ErrorClass::Transient,
            Self::StoreErr { ref source, .. } => match *source {
                StoreError::NotFound { .. } | StoreError::Fatal { .. } => ErrorClass::Terminal,
                StoreError::Conflict { .. } => ErrorClass::Conflict,
                StoreError::Transient { .. } => ErrorClass::Transient,
            },
            Self::DriverErr { ref source, .. } => match *source {
                DriverError::Terminal { .. } => ErrorClass::Terminal,
                DriverError::PreconditionBlocked { .. } => ErrorClass::PreconditionBlocked,
                DriverError::Transient { .. } => ErrorClass::Transient,
            },
        }
    }

    /// Add context for `ExpandError`
    pub fn add_context<C>(mut self, ctx: C) -> Self
    where
        C: Into<String>,
    {
        /// Push the context line onto whichever variant holds the error.
        macro_rules! append_context {
            ($context: ident, [$($target:ident),*]) => {
                match self {
                    $(Self::$target { ref mut context, ..} => {
                        context.push($context.into());
                    },)*
                }
            }
        }
        append_context!(ctx, [ArgumentInvalid, StoreErr, DriverErr, Cancelled]);
        self
    }

    /// Add context for `ExpandError` lazily
    pub fn with_context<C, F>(self, f: F) -> Self
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.add_context(f())
    }
}

/// Add context to `ExpandResult`
pub trait Context<T, E> {
    /// Add context to `ExpandResult`
    fn add_context<C>(self, ctx: C) -> ExpandResult<T>
    where
        C: Into<String>;

    /// Add context to `ExpandResult` lazily
    fn with_context<C, F>(self, f: F) -> ExpandResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> Context<T, E> for Result<T, E>
where
    E: std::error::Error + Into<ExpandError>,
{
    #[inline]
    fn add_context<C>(self, ctx: C) -> ExpandResult<T>
    where
        C: Into<String>,
    {
        self.map_err(|e| e.into().add_context(ctx))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> ExpandResult<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().add_context(f()))
    }
}

/// Implement `From<$source>` wrapping the source into variant `$target`.
macro_rules! implement_from {
    ($source: path, $target: ident) => {
        impl From<$source> for ExpandError {
            #[inline]
            fn from(error: $source) -> Self {
                Self::$target {
                    source: error,
                    context: vec![],
                }
            }
        }
    };
}
implement_from!(StoreError, StoreErr);
implement_from!(DriverError, DriverErr);
