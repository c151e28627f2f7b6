//! Error taxonomy for the type-graph core.
//!
//! Structural input errors (empty unions, unbreakable cycles, dropped
//! attributes) are typed results the driver can localize. Invariant
//! violations abort the process through [`internal_assert!`] and are never
//! caught.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unions must have at least one member")]
    NoEmptyUnions,

    #[error("cycle of {cycle_size} types contains no forward-declarable type")]
    NoForwardDeclarableTypeInCycle { cycle_size: usize },

    #[error("{count} type attribute(s) were not propagated across a rewrite: {examples:?}")]
    TypeAttributesNotPropagated {
        count: usize,
        examples: Vec<String>,
    },

    #[error("rewrite pipeline did not converge after {iterations} iterations")]
    FixedPointOverflow { iterations: usize },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl GraphError {
    pub fn internal(message: impl Into<String>) -> Self {
        GraphError::Internal {
            message: message.into(),
        }
    }
}

/// Assert an internal consistency condition.
///
/// Violations are programming errors, not input errors, so this panics;
/// the panic message carries the `internal error:` prefix the driver's
/// top-level reporter keys on.
#[macro_export]
macro_rules! internal_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("internal error: {}", format_args!($($arg)+));
        }
    };
    ($cond:expr) => {
        if !$cond {
            panic!("internal error: assertion failed: {}", stringify!($cond));
        }
    };
}

/// Unconditional internal failure, for unreachable states.
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)+) => {
        panic!("internal error: {}", format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::NoEmptyUnions;
        assert_eq!(err.to_string(), "unions must have at least one member");

        let err = GraphError::NoForwardDeclarableTypeInCycle { cycle_size: 3 };
        assert!(err.to_string().contains("cycle of 3 types"));
    }

    #[test]
    #[should_panic(expected = "internal error")]
    fn test_internal_assert_panics() {
        internal_assert!(1 + 1 == 3, "arithmetic is broken");
    }

    #[test]
    fn test_internal_assert_passes() {
        internal_assert!(true, "never shown");
    }
}
