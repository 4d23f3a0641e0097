#![forbid(unsafe_code)]

//! Fault taxonomy for holders.
//!
//! A holder that has never been set is *not* in error: [`Holder::get`]
//! simply returns `None`. The types here describe the fault a holder enters
//! when the work that should have produced its value failed.
//!
//! All errors are `Clone` so a single fault can be stored on a holder and
//! handed to every reader and fault listener.
//!
//! [`Holder::get`]: crate::Holder::get

use thiserror::Error;

/// Convenience alias for fallible transforms.
pub type Result<T> = std::result::Result<T, HolderError>;

/// Integer arithmetic faults. Floating-point kinds never produce these for
/// division; they follow IEEE 754 instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArithmeticError {
    #[error("integer division by zero")]
    DivideByZero,

    #[error("integer remainder by zero")]
    RemainderByZero,

    #[error("{value} is not representable as a 32-bit integer")]
    NotRepresentable { value: f64 },
}

/// Failure reported by a cache backing for one request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("fetch failed: {message}")]
    Failed { message: String },

    /// The completion handle was dropped without reporting a result.
    #[error("fetch abandoned before completion")]
    Abandoned,
}

impl FetchError {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// The fault a holder carries when its value could not be produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HolderError {
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// A derivation's transform function failed.
    #[error("transform failed: {message}")]
    Transform { message: String },

    #[error("{0}")]
    Fetch(#[from] FetchError),
}

impl HolderError {
    #[must_use]
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Whether this fault came from a cache backing.
    #[must_use]
    pub fn is_fetch(&self) -> bool {
        matches!(self, Self::Fetch(_))
    }
}
