use crate::error::{internal_error, DocSyncError};

/// Builds the internal-failure error used when a store invariant is violated.
///
/// Invariant violations are programming errors, not user errors; they surface
/// with the `docsync/internal` code and the failing operation's label.
pub fn assertion_error(message: impl AsRef<str>) -> DocSyncError {
    internal_error(format!("INTERNAL ASSERTION FAILED: {}", message.as_ref()))
}

/// Returns an assertion error unless `condition` holds.
pub fn hard_assert(condition: bool, message: impl AsRef<str>) -> Result<(), DocSyncError> {
    if condition {
        Ok(())
    } else {
        Err(assertion_error(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_when_condition_holds() {
        assert!(hard_assert(true, "fine").is_ok());
    }

    #[test]
    fn fails_with_internal_code() {
        let err = hard_assert(false, "boom").unwrap_err();
        assert_eq!(err.code_str(), "docsync/internal");
        assert!(err.to_string().contains("boom"));
    }
}
