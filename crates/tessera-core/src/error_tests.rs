//! Tests for error module

#[cfg(test)]
mod tests {
    use crate::error::Error;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).code(), "TESS-001");
        assert_eq!(Error::Precondition("x".into()).code(), "TESS-002");
        assert_eq!(
            Error::OldSchemaNotDeleted { remaining_secs: 3 }.code(),
            "TESS-004"
        );
        assert_eq!(Error::EditLog("x".into()).code(), "TESS-012");
        assert_eq!(Error::Internal("x".into()).code(), "TESS-015");
    }

    #[test]
    fn test_error_display_contains_code() {
        // Arrange
        let err = Error::ColumnNotFound("k2".to_string());

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.starts_with("[TESS-009]"));
        assert!(msg.contains("k2"));
    }

    #[test]
    fn test_old_schema_message_names_wait_time() {
        let err = Error::OldSchemaNotDeleted { remaining_secs: 42 };
        assert!(err.to_string().contains("wait 42 second(s)"));
    }

    #[test]
    fn test_recoverability() {
        assert!(Error::Validation("bad".into()).is_recoverable());
        assert!(Error::Precondition("replicas".into()).is_recoverable());
        assert!(!Error::EditLog("disk full".into()).is_recoverable());
        assert!(!Error::Internal("bug".into()).is_recoverable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(Error::Validation("x".into()).is_validation());
        assert!(Error::NothingChanged("x".into()).is_validation());
        assert!(!Error::Precondition("x".into()).is_validation());
        assert!(!Error::TableBusy("t".into(), "rollup".into()).is_validation());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: Error = io.into();
        assert_eq!(err.code(), "TESS-013");
    }
}
