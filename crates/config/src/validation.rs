//! Validation helpers shared by the config sections

pub use crate::error::ValidationError;

/// A named section of the config file that can check and merge itself
pub trait ConfigSection: Default {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;

    /// Merges another section into this one; values from `other` win
    fn merge(&mut self, other: Self);

    /// Table name in the TOML file
    fn section_name(&self) -> &'static str;
}

/// Common validators for config values
pub struct Validator;

impl Validator {
    /// Validates that a numeric value is within an inclusive range
    pub fn in_range<T>(value: T, min: T, max: T, field: &str) -> Result<(), ValidationError>
    where
        T: PartialOrd + std::fmt::Display + Copy,
    {
        // NaN fails both comparisons, so test the accepted range positively
        if value >= min && value <= max {
            Ok(())
        } else {
            Err(ValidationError::with_value(
                field,
                format!("must be between {} and {}", min, max),
                value,
            ))
        }
    }

    /// Validates that a string is not blank
    pub fn not_empty(value: &str, field: &str) -> Result<(), ValidationError> {
        if value.trim().is_empty() {
            Err(ValidationError::new(field, "must not be empty"))
        } else {
            Ok(())
        }
    }

    /// Collects multiple validation results into a single result
    pub fn collect_errors(
        results: Vec<Result<(), ValidationError>>,
    ) -> Result<(), Vec<ValidationError>> {
        let errors: Vec<ValidationError> = results.into_iter().filter_map(|r| r.err()).collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_bounds_are_inclusive() {
        assert!(Validator::in_range(0.75, 0.75, 2.0, "speed").is_ok());
        assert!(Validator::in_range(2.0, 0.75, 2.0, "speed").is_ok());
        assert!(Validator::in_range(2.01, 0.75, 2.0, "speed").is_err());
    }

    #[test]
    fn test_in_range_rejects_nan() {
        assert!(Validator::in_range(f32::NAN, 0.75, 2.0, "speed").is_err());
    }

    #[test]
    fn test_not_empty() {
        assert!(Validator::not_empty("info", "level").is_ok());
        assert!(Validator::not_empty("   ", "level").is_err());
    }

    #[test]
    fn test_collect_errors() {
        let result = Validator::collect_errors(vec![
            Ok(()),
            Err(ValidationError::new("one", "bad")),
            Err(ValidationError::new("two", "bad")),
        ]);
        assert_eq!(result.unwrap_err().len(), 2);
        assert!(Validator::collect_errors(vec![Ok(()), Ok(())]).is_ok());
    }
}
