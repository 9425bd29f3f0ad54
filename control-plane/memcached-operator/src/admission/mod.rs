//! Synchronous admission: defaulting then validation, run by the webhook for
//! every create/update of a Memcached document.

pub mod defaulter;
pub mod quantity;
pub mod validator;

use std::fmt;

use crate::conversion::Convertible;
use crate::crd::{hub, v1alpha1 as alpha};

pub use defaulter::default_memcached;
pub use validator::validate_memcached;

/// One rejected field with a human readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Memcached {name:?} is invalid: {}", join(.violations))]
pub struct ValidationError {
    pub name: String,
    pub violations: Vec<FieldViolation>,
}

fn join(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// `Ok` when nothing was violated.
    pub fn check(
        name: impl Into<String>,
        violations: Vec<FieldViolation>,
    ) -> Result<(), ValidationError> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                name: name.into(),
                violations,
            })
        }
    }
}

/// Typed defaulting/validation callbacks for one concrete document type.
pub struct AdmissionHooks<K> {
    pub default: fn(&mut K),
    pub validate: fn(&K) -> Vec<FieldViolation>,
}

impl<K> Clone for AdmissionHooks<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for AdmissionHooks<K> {}

pub fn hub_hooks() -> AdmissionHooks<hub::Memcached> {
    AdmissionHooks {
        default: default_memcached,
        validate: validate_memcached,
    }
}

/// Spoke documents are defaulted and validated in hub form.
pub fn v1alpha1_hooks() -> AdmissionHooks<alpha::Memcached> {
    AdmissionHooks {
        default: |obj| {
            let mut hub = obj.to_hub();
            default_memcached(&mut hub);
            *obj = alpha::Memcached::from_hub(&hub);
        },
        validate: |obj| validate_memcached(&obj.to_hub()),
    }
}
