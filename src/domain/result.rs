//! Result type alias for wbhi-sync

use super::errors::WbhiError;

/// Result type alias for wbhi-sync operations
///
/// # Examples
///
/// ```
/// use wbhi_sync::domain::result::Result;
/// use wbhi_sync::domain::errors::WbhiError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(WbhiError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, WbhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_with_question_mark() -> Result<()> {
        fn inner() -> Result<i32> {
            Ok(42)
        }

        let value = inner()?;
        assert_eq!(value, 42);
        Ok(())
    }
}
