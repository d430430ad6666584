use super::domain::Application;

/// Error raised when eligibility cannot be evaluated.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EligibilityError {
    #[error("eligibility requires at least the current application")]
    EmptyGroup,
}

/// Decides whether a group of applications sharing a property may still
/// request owner consent.
///
/// The group is ineligible when any member has already received consent and
/// is not in a terminal status: an already-consented, still-live application
/// anywhere on the property blocks new consent. Pure function over the
/// supplied snapshot; no external calls.
pub fn is_eligible(applications: &[Application]) -> Result<bool, EligibilityError> {
    if applications.is_empty() {
        return Err(EligibilityError::EmptyGroup);
    }

    let property_consented = applications
        .iter()
        .any(|application| application.has_received_consent() && !application.sub_status.is_terminal());

    Ok(!property_consented)
}
