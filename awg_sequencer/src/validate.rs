//! Clamp-and-report validation.
//!
//! Setters never fail on out-of-range input. They substitute the nearest
//! safe value and return it wrapped in [`Validated::Clamped`] together with
//! one [`Diagnostic`] per rejected parameter. Each diagnostic is also logged
//! at WARN level when it is created.

use std::fmt;
use tracing::warn;

/// One rejected input and the value substituted for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Parameter name as the caller knows it.
    pub parameter: &'static str,
    /// Human-readable account of the bound that was violated.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic and log it.
    pub fn new(parameter: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(parameter, "{}", message);
        Self { parameter, message }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.parameter, self.message)
    }
}

/// A value that passed validation as given, or was clamped.
#[derive(Debug, Clone, PartialEq)]
pub enum Validated<T> {
    /// Input accepted unchanged.
    Accepted(T),
    /// Input replaced by a safe value.
    Clamped {
        /// Value actually applied.
        value: T,
        /// Why the input was replaced.
        warnings: Vec<Diagnostic>,
    },
}

impl<T> Validated<T> {
    /// Wrap `value`, marking it clamped when `warnings` is non-empty.
    pub fn from_parts(value: T, warnings: Vec<Diagnostic>) -> Self {
        if warnings.is_empty() {
            Self::Accepted(value)
        } else {
            Self::Clamped { value, warnings }
        }
    }

    /// Value applied, clamped or not.
    pub fn value(&self) -> &T {
        match self {
            Self::Accepted(value) | Self::Clamped { value, .. } => value,
        }
    }

    /// Consume and return the applied value.
    pub fn into_value(self) -> T {
        match self {
            Self::Accepted(value) | Self::Clamped { value, .. } => value,
        }
    }

    /// Diagnostics raised, empty when accepted.
    pub fn warnings(&self) -> &[Diagnostic] {
        match self {
            Self::Accepted(_) => &[],
            Self::Clamped { warnings, .. } => warnings,
        }
    }

    /// True when the input was replaced.
    pub fn is_clamped(&self) -> bool {
        matches!(self, Self::Clamped { .. })
    }

    /// Transform the value, keeping the diagnostics.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Validated<U> {
        match self {
            Self::Accepted(value) => Validated::Accepted(f(value)),
            Self::Clamped { value, warnings } => Validated::Clamped {
                value: f(value),
                warnings,
            },
        }
    }
}

/// Collects diagnostics while a multi-field input is checked.
#[derive(Debug, Default)]
pub(crate) struct Checker {
    warnings: Vec<Diagnostic>,
}

impl Checker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a rejected parameter.
    pub(crate) fn reject(&mut self, parameter: &'static str, message: impl Into<String>) {
        self.warnings.push(Diagnostic::new(parameter, message));
    }

    /// Keep diagnostics raised by a nested check.
    pub(crate) fn absorb<T>(&mut self, validated: Validated<T>) -> T {
        match validated {
            Validated::Accepted(value) => value,
            Validated::Clamped { value, warnings } => {
                self.warnings.extend(warnings);
                value
            }
        }
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub(crate) fn finish<T>(self, value: T) -> Validated<T> {
        Validated::from_parts(value, self.warnings)
    }
}

/// Clamp `value` into `min..=max`, reporting the substitution.
pub(crate) fn clamp_range<T>(parameter: &'static str, value: T, min: T, max: T) -> Validated<T>
where
    T: PartialOrd + Copy + fmt::Display,
{
    if value < min {
        Validated::Clamped {
            value: min,
            warnings: vec![Diagnostic::new(
                parameter,
                format!("{value} is below the minimum {min}; using {min}"),
            )],
        }
    } else if value > max {
        Validated::Clamped {
            value: max,
            warnings: vec![Diagnostic::new(
                parameter,
                format!("{value} exceeds the maximum {max}; using {max}"),
            )],
        }
    } else {
        Validated::Accepted(value)
    }
}
