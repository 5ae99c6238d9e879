//! Numeric validation utilities

use crate::error::{BgRemovalError, Result};

/// Validator for numeric ranges
pub struct NumericValidator;

impl NumericValidator {
    /// Validate numeric range (inclusive)
    pub fn validate_range<T>(value: T, min: T, max: T, name: &str) -> Result<T>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        if value < min || value > max {
            return Err(BgRemovalError::configuration(format!(
                "{} must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    /// Validate that a tensor dimension is usable as an image side
    pub fn validate_dimension(value: u32, name: &str) -> Result<u32> {
        if value == 0 {
            return Err(BgRemovalError::processing(format!(
                "{} must be positive, got 0",
                name
            )));
        }
        Ok(value)
    }

    /// Validate thread count
    pub fn validate_thread_count(value: usize) -> Result<usize> {
        const MAX_THREADS: usize = 256;

        if value > MAX_THREADS {
            return Err(BgRemovalError::configuration(format!(
                "Thread count {} exceeds maximum allowed ({})",
                value, MAX_THREADS
            )));
        }

        Ok(value)
    }
}
