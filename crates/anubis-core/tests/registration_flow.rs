use std::sync::Arc;
use std::time::Duration;

use anubis_core::error::{AuthError, ValidationError};
use anubis_core::{ClientError, Field, FieldStatus, RegistrationConfig, RegistrationValidator};
use anubis_testkit::{MemoryService, Op};

fn validator(service: &MemoryService) -> RegistrationValidator {
    RegistrationValidator::new(Arc::new(service.clone()), &RegistrationConfig::default())
}

async fn fill_valid_form(v: &mut RegistrationValidator) {
    v.set_username("neo");
    v.set_email("neo@matrix.io");
    v.set_password("Aa1!aaaa");
    v.set_confirm("Aa1!aaaa");
    v.settle().await;
}

#[tokio::test(start_paused = true)]
async fn malformed_usernames_are_rejected_without_lookup() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    for (name, reason) in [
        ("ab", "Minimum 3 characters"),
        ("a_very_long_username_x", "Maximum 20 characters"),
        ("bad name", "Only letters, digits, _ and -"),
        ("ünïcode", "Only letters, digits, _ and -"),
        ("drop;table", "Only letters, digits, _ and -"),
    ] {
        v.set_username(name);
        assert_eq!(v.form().username.status, FieldStatus::Invalid, "{name}");
        assert_eq!(v.form().username.message, reason, "{name}");

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!v.is_checking(), "{name}");
    }

    assert!(service.name_checks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn keystrokes_inside_the_debounce_window_issue_one_lookup() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    v.set_username("ali");
    tokio::time::sleep(Duration::from_millis(100)).await;
    v.set_username("alic");
    tokio::time::sleep(Duration::from_millis(100)).await;
    v.set_username("alice");
    assert_eq!(v.form().username.status, FieldStatus::Checking);
    assert_eq!(v.form().username.message, "Checking availability...");

    v.settle().await;
    assert_eq!(service.name_checks(), vec!["alice".to_string()]);
    assert_eq!(v.form().username.status, FieldStatus::Valid);
    assert_eq!(v.form().username.message, "Username is available");
}

#[tokio::test(start_paused = true)]
async fn slow_result_for_an_older_value_is_never_applied() {
    let service = MemoryService::new();
    service.add_user("alice", "alice@example.com", "secret1");
    service.set_lookup_delay("alice", Duration::from_secs(2));
    let mut v = validator(&service);

    v.set_username("alice");
    // Past the debounce: the "alice" lookup is now in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;
    v.set_username("alicia");

    assert_eq!(v.next_outcome().await, Some(Field::Username));
    assert_eq!(v.form().username.status, FieldStatus::Valid);
    assert_eq!(v.form().username.message, "Username is available");

    // Whatever "alice" would have answered, the field keeps the latest result.
    let _ = tokio::time::timeout(Duration::from_secs(5), v.next_outcome()).await;
    assert_eq!(v.form().username.status, FieldStatus::Valid);
    assert_eq!(
        service.name_checks(),
        vec!["alice".to_string(), "alicia".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn taken_values_are_invalid_with_backend_reason() {
    let service = MemoryService::new();
    service.add_user("trinity", "trinity@matrix.io", "secret1");
    let mut v = validator(&service);

    v.set_username("Trinity");
    v.set_email("trinity@matrix.io");
    v.settle().await;

    assert_eq!(v.form().username.status, FieldStatus::Invalid);
    assert_eq!(v.form().username.message, "Username is already taken");
    assert_eq!(v.form().email.status, FieldStatus::Invalid);
    assert_eq!(v.form().email.message, "Email is already in use");
}

#[tokio::test(start_paused = true)]
async fn failed_lookup_degrades_to_invalid_and_next_keystroke_retries() {
    let service = MemoryService::new();
    service.fail(Op::EmailCheck);
    let mut v = validator(&service);

    v.set_email("neo@matrix.io");
    v.settle().await;
    assert_eq!(v.form().email.status, FieldStatus::Invalid);
    assert_eq!(v.form().email.message, "Check failed, try again");

    service.recover(Op::EmailCheck);
    v.set_email("neo@matrix.org");
    v.settle().await;
    assert_eq!(v.form().email.status, FieldStatus::Valid);
    assert_eq!(service.email_checks().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn malformed_email_skips_lookup() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    v.set_email("neo@matrix");
    assert_eq!(v.form().email.message, "Invalid email format");
    v.set_email("");
    assert_eq!(v.form().email.message, "Email is required");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(service.email_checks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn password_and_confirmation_track_each_other() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    v.set_password("abc");
    assert_eq!(v.form().password.message, "Minimum 6 characters");
    assert_eq!(v.form().confirm.status, FieldStatus::Unchecked);

    v.set_password("Aa1!aaaa");
    assert_eq!(v.form().password.status, FieldStatus::Valid);
    assert_eq!(v.form().password.message, "Strength: Excellent");
    assert_eq!(v.strength().value(), 5);

    v.set_confirm("Aa1!aaa");
    assert_eq!(v.form().confirm.message, "Passwords do not match");

    v.set_confirm("Aa1!aaaa");
    assert!(v.form().confirm.is_valid());

    // Changing the password afterwards invalidates the confirmation again.
    v.set_password("Aa1!aaaab");
    assert_eq!(v.form().confirm.status, FieldStatus::Invalid);
}

#[tokio::test(start_paused = true)]
async fn submit_is_refused_locally_until_every_field_is_valid() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    v.set_username("neo");
    v.set_password("Aa1!aaaa");
    v.set_confirm("Aa1!aaaa");
    // Username still Checking and email untouched.
    assert!(!v.submit_enabled());

    let err = v.submit().await.unwrap_err();
    assert_eq!(err, ClientError::Validation(ValidationError::FormIncomplete));
    assert_eq!(service.registrations(), 0);
}

#[tokio::test(start_paused = true)]
async fn complete_form_registers_the_account() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    fill_valid_form(&mut v).await;
    assert!(v.submit_enabled());

    let account_id = v.submit().await.unwrap();
    assert_eq!(service.registrations(), 1);
    assert_eq!(
        service.status_of(&account_id),
        Some(anubis_types::models::PresenceStatus::Offline)
    );
}

#[tokio::test(start_paused = true)]
async fn backend_rejection_is_surfaced_verbatim() {
    let service = MemoryService::new();
    let mut v = validator(&service);
    fill_valid_form(&mut v).await;

    // Someone else claims the name between the lookup and the submit.
    service.add_user("neo", "other@matrix.io", "secret1");

    let err = v.submit().await.unwrap_err();
    assert_eq!(err, ClientError::Auth(AuthError::UsernameTaken));
    assert_eq!(err.to_string(), "This username is already taken");
}

#[tokio::test(start_paused = true)]
async fn closing_cancels_outstanding_lookups() {
    let service = MemoryService::new();
    let mut v = validator(&service);

    v.set_username("neo");
    v.close();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(service.name_checks().is_empty());
}
