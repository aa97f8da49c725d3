//! Tests for the receiver contract.

use super::*;

#[test]
fn test_zero_max_messages_is_rejected() {
    let result = validate_max_messages(0);

    assert!(matches!(
        result,
        Err(ValidationError::OutOfRange { ref field, .. }) if field == "max_messages"
    ));
}

#[test]
fn test_positive_max_messages_is_accepted() {
    assert!(validate_max_messages(1).is_ok());
    assert!(validate_max_messages(500).is_ok());
}

#[test]
fn test_zero_max_messages_converts_to_validation_error() {
    let err: MessagingError = validate_max_messages(0).unwrap_err().into();

    assert!(matches!(err, MessagingError::Validation(_)));
    assert!(!err.is_transient());
}
