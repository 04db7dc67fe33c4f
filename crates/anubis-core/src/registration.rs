//! Registration form validation.
//!
//! Each keystroke is classified synchronously. Usernames and emails that pass
//! the format rules then go through a debounced availability lookup running on
//! a background task. Lookups are sequence-stamped per field: a result is only
//! applied while its stamp is still the latest one issued for that field, and
//! a newer keystroke cancels the older lookup outright.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use anubis_types::api::{Availability, RegisterRequest};
use anubis_types::models::AccountId;

use crate::config::RegistrationConfig;
use crate::error::{AvailabilityCheckError, ClientError, ServiceError, ValidationError};
use crate::password::{MIN_PASSWORD_LEN, PasswordStrength};
use crate::service::ChatService;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 20;

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("username pattern compiles"));

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

const CHECKING: &str = "Checking availability...";
const CHECK_FAILED: &str = "Check failed, try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Username,
    Email,
    Password,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldStatus {
    #[default]
    Unchecked,
    Checking,
    Valid,
    Invalid,
}

/// Validity of one form field plus its user-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldState {
    pub status: FieldStatus,
    pub message: String,
}

impl FieldState {
    pub fn checking() -> Self {
        Self::with(FieldStatus::Checking, CHECKING)
    }

    pub fn valid(message: impl Into<String>) -> Self {
        Self::with(FieldStatus::Valid, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::with(FieldStatus::Invalid, message)
    }

    fn with(status: FieldStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == FieldStatus::Valid
    }
}

/// Read-only view of the four tracked fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrationForm {
    pub username: FieldState,
    pub email: FieldState,
    pub password: FieldState,
    pub confirm: FieldState,
}

impl RegistrationForm {
    /// True iff all four fields are Valid.
    pub fn submit_enabled(&self) -> bool {
        self.username.is_valid()
            && self.email.is_valid()
            && self.password.is_valid()
            && self.confirm.is_valid()
    }

    pub fn field(&self, field: Field) -> &FieldState {
        match field {
            Field::Username => &self.username,
            Field::Email => &self.email,
            Field::Password => &self.password,
            Field::Confirm => &self.confirm,
        }
    }

    fn field_mut(&mut self, field: Field) -> &mut FieldState {
        match field {
            Field::Username => &mut self.username,
            Field::Email => &mut self.email,
            Field::Password => &mut self.password,
            Field::Confirm => &mut self.confirm,
        }
    }
}

/// Format rules for a username. `Err` carries the message shown to the user.
pub fn check_username_format(name: &str) -> Result<(), &'static str> {
    let len = name.chars().count();
    if len == 0 {
        return Err("Username is required");
    }
    if len < USERNAME_MIN_LEN {
        return Err("Minimum 3 characters");
    }
    if len > USERNAME_MAX_LEN {
        return Err("Maximum 20 characters");
    }
    if !USERNAME_PATTERN.is_match(name) {
        return Err("Only letters, digits, _ and -");
    }
    Ok(())
}

pub fn check_email_format(email: &str) -> Result<(), &'static str> {
    if email.is_empty() {
        return Err("Email is required");
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err("Invalid email format");
    }
    Ok(())
}

/// Sequence stamps for one field's lookups.
#[derive(Debug, Default)]
struct CheckSlot {
    seq: u64,
    in_flight: Option<CancellationToken>,
}

impl CheckSlot {
    /// Supersedes whatever is in flight and returns the new stamp.
    fn begin(&mut self) -> u64 {
        self.cancel();
        self.seq += 1;
        self.seq
    }

    fn is_current(&self, seq: u64) -> bool {
        self.seq == seq
    }

    fn cancel(&mut self) {
        if let Some(token) = self.in_flight.take() {
            token.cancel();
        }
    }
}

#[derive(Debug)]
struct CheckOutcome {
    field: Field,
    seq: u64,
    result: Result<Availability, ServiceError>,
}

#[derive(Debug, Default)]
struct FormValues {
    username: String,
    email: String,
    password: String,
    confirm: String,
}

/// Owns the registration screen's validation state.
///
/// Must be driven from inside a tokio runtime: setting a username or email
/// spawns the lookup task. Results are applied by [`next_outcome`] or
/// [`settle`]; dropping the validator cancels every outstanding lookup.
///
/// [`next_outcome`]: RegistrationValidator::next_outcome
/// [`settle`]: RegistrationValidator::settle
pub struct RegistrationValidator {
    service: Arc<dyn ChatService>,
    debounce: Duration,
    form: RegistrationForm,
    values: FormValues,
    strength: PasswordStrength,
    username_check: CheckSlot,
    email_check: CheckSlot,
    outcomes_tx: mpsc::UnboundedSender<CheckOutcome>,
    outcomes_rx: mpsc::UnboundedReceiver<CheckOutcome>,
}

impl RegistrationValidator {
    pub fn new(service: Arc<dyn ChatService>, config: &RegistrationConfig) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        Self {
            service,
            debounce: config.check_debounce,
            form: RegistrationForm::default(),
            values: FormValues::default(),
            strength: PasswordStrength::score(""),
            username_check: CheckSlot::default(),
            email_check: CheckSlot::default(),
            outcomes_tx,
            outcomes_rx,
        }
    }

    pub fn form(&self) -> &RegistrationForm {
        &self.form
    }

    pub fn submit_enabled(&self) -> bool {
        self.form.submit_enabled()
    }

    pub fn strength(&self) -> PasswordStrength {
        self.strength
    }

    /// True while a lookup for the latest username or email is outstanding.
    pub fn is_checking(&self) -> bool {
        self.form.username.status == FieldStatus::Checking
            || self.form.email.status == FieldStatus::Checking
    }

    pub fn set_username(&mut self, value: &str) {
        self.values.username = value.to_string();
        let seq = self.username_check.begin();

        match check_username_format(value) {
            Err(reason) => self.form.username = FieldState::invalid(reason),
            Ok(()) => {
                self.form.username = FieldState::checking();
                let token = self.spawn_lookup(Field::Username, seq, value.to_string());
                self.username_check.in_flight = Some(token);
            }
        }
    }

    pub fn set_email(&mut self, value: &str) {
        self.values.email = value.to_string();
        let seq = self.email_check.begin();

        match check_email_format(value) {
            Err(reason) => self.form.email = FieldState::invalid(reason),
            Ok(()) => {
                self.form.email = FieldState::checking();
                let token = self.spawn_lookup(Field::Email, seq, value.to_string());
                self.email_check.in_flight = Some(token);
            }
        }
    }

    pub fn set_password(&mut self, value: &str) {
        self.values.password = value.to_string();
        self.strength = PasswordStrength::score(value);

        self.form.password = if value.chars().count() >= MIN_PASSWORD_LEN {
            FieldState::valid(format!("Strength: {}", self.strength.label()))
        } else {
            FieldState::invalid("Minimum 6 characters")
        };
        self.recompute_confirm();
    }

    pub fn set_confirm(&mut self, value: &str) {
        self.values.confirm = value.to_string();
        self.recompute_confirm();
    }

    fn recompute_confirm(&mut self) {
        // An untouched confirmation stays Unchecked while the password is typed.
        if self.values.confirm.is_empty() && self.form.confirm.status == FieldStatus::Unchecked {
            return;
        }
        self.form.confirm = if self.values.confirm.is_empty() {
            FieldState::invalid("Repeat the password")
        } else if self.values.confirm == self.values.password {
            FieldState::valid("Passwords match")
        } else {
            FieldState::invalid("Passwords do not match")
        };
    }

    fn spawn_lookup(&self, field: Field, seq: u64, value: String) -> CancellationToken {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let service = Arc::clone(&self.service);
        let tx = self.outcomes_tx.clone();
        let debounce = self.debounce;

        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => return,
                _ = tokio::time::sleep(debounce) => {}
            }

            let lookup = async {
                match field {
                    Field::Email => service.check_email_available(&value).await,
                    _ => service.check_name_available(&value).await,
                }
            };
            let result = tokio::select! {
                _ = cancelled.cancelled() => return,
                result = lookup => result,
            };

            // The receiver only goes away with the validator itself.
            let _ = tx.send(CheckOutcome { field, seq, result });
        });

        token
    }

    /// Waits for the next lookup result and applies it if it is still
    /// current. Returns the field it changed, or `None` for a stale result.
    pub async fn next_outcome(&mut self) -> Option<Field> {
        let outcome = self.outcomes_rx.recv().await?;
        self.apply(outcome)
    }

    /// Applies lookup results until no field is left in Checking.
    pub async fn settle(&mut self) {
        while self.is_checking() {
            self.next_outcome().await;
        }
    }

    fn apply(&mut self, outcome: CheckOutcome) -> Option<Field> {
        let slot = match outcome.field {
            Field::Username => &mut self.username_check,
            Field::Email => &mut self.email_check,
            _ => return None,
        };
        if !slot.is_current(outcome.seq) {
            debug!(field = ?outcome.field, seq = outcome.seq, "dropping stale availability result");
            return None;
        }
        slot.in_flight = None;

        let state = match outcome.result {
            Ok(Availability {
                available: true,
                reason,
            }) => FieldState::valid(reason),
            Ok(Availability {
                available: false,
                reason,
            }) => FieldState::invalid(reason),
            Err(e) => {
                warn!("{}", AvailabilityCheckError(e));
                FieldState::invalid(CHECK_FAILED)
            }
        };
        *self.form.field_mut(outcome.field) = state;
        Some(outcome.field)
    }

    /// Registers the account. Refused locally unless every field is Valid.
    pub async fn submit(&mut self) -> Result<AccountId, ClientError> {
        if !self.submit_enabled() {
            return Err(ValidationError::FormIncomplete.into());
        }

        let request = RegisterRequest {
            username: self.values.username.clone(),
            email: self.values.email.clone(),
            password: self.values.password.clone(),
        };
        let account_id = self.service.register_account(&request).await?;

        info!("Registered {} as {}", request.username, account_id);
        Ok(account_id)
    }

    /// Cancels outstanding lookups; called when leaving the screen.
    pub fn close(&mut self) {
        self.username_check.cancel();
        self.email_check.cancel();
    }
}

impl Drop for RegistrationValidator {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_format_rules() {
        assert_eq!(check_username_format("ab"), Err("Minimum 3 characters"));
        assert_eq!(check_username_format(""), Err("Username is required"));
        assert_eq!(
            check_username_format("a_very_long_username_x"),
            Err("Maximum 20 characters")
        );
        assert_eq!(
            check_username_format("bad name"),
            Err("Only letters, digits, _ and -")
        );
        assert_eq!(
            check_username_format("ünïcode"),
            Err("Only letters, digits, _ and -")
        );
        assert!(check_username_format("validUser_1").is_ok());
        assert!(check_username_format("abc").is_ok());
        assert!(check_username_format("a-b-c-d-e-f-g-h-i-j0").is_ok());
    }

    #[test]
    fn email_format_rules() {
        assert!(check_email_format("neo@matrix.io").is_ok());
        assert_eq!(check_email_format(""), Err("Email is required"));
        assert_eq!(check_email_format("neo@matrix"), Err("Invalid email format"));
        assert_eq!(check_email_format("neo matrix@io.x"), Err("Invalid email format"));
        assert_eq!(check_email_format("@matrix.io"), Err("Invalid email format"));
    }

    #[test]
    fn submit_enabled_only_when_all_valid() {
        let states = [FieldState::invalid("no"), FieldState::valid("ok")];
        for mask in 0u8..16 {
            let pick = |bit: u8| states[((mask >> bit) & 1) as usize].clone();
            let form = RegistrationForm {
                username: pick(0),
                email: pick(1),
                password: pick(2),
                confirm: pick(3),
            };
            assert_eq!(form.submit_enabled(), mask == 0b1111, "mask {mask:04b}");
        }
    }

    #[test]
    fn checking_and_unchecked_never_enable_submit() {
        let form = RegistrationForm {
            username: FieldState::checking(),
            email: FieldState::valid("ok"),
            password: FieldState::valid("ok"),
            confirm: FieldState::default(),
        };
        assert!(!form.submit_enabled());
    }

    #[test]
    fn check_slot_only_honours_latest_stamp() {
        let mut slot = CheckSlot::default();
        let first = slot.begin();
        let token = CancellationToken::new();
        slot.in_flight = Some(token.clone());

        let second = slot.begin();
        assert!(token.is_cancelled());
        assert!(!slot.is_current(first));
        assert!(slot.is_current(second));
    }
}
