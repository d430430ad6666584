use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, TimeZone, Utc};

use super::common::*;
use crate::consent::token::{ConsentTokenService, TokenError, TokenVerification};

fn service() -> ConsentTokenService {
    ConsentTokenService::new(TEST_SECRET)
}

#[test]
fn issue_then_verify_round_trips_the_claims() {
    let tokens = service();
    let id = consent_request_id(42);

    let issued = tokens.issue(id, 14).expect("token issues");
    let verification = tokens.verify(&issued.token).expect("verify runs");

    assert_eq!(
        verification,
        TokenVerification::Accepted {
            consent_request_id: id,
            expiry: issued.expires,
        }
    );
}

#[test]
fn expiry_rounds_up_to_end_of_target_day() {
    let tokens = service();
    let issued_morning = tokens
        .issue_at(
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single().expect("valid date"),
            consent_request_id(1),
            14,
        )
        .expect("token issues");

    assert_eq!(
        issued_morning.expires,
        Utc.with_ymd_and_hms(2024, 1, 15, 23, 59, 59).single().expect("valid date")
    );

    // Same calendar day, later time of day: identical expiry.
    let issued_evening = tokens
        .issue_at(
            Utc.with_ymd_and_hms(2024, 1, 1, 22, 45, 10).single().expect("valid date"),
            consent_request_id(1),
            14,
        )
        .expect("token issues");
    assert_eq!(issued_evening.expires, issued_morning.expires);
}

#[test]
fn expired_token_is_rejected_not_an_error() {
    let tokens = service();
    let issued = tokens
        .issue_at(
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).single().expect("valid date"),
            consent_request_id(7),
            14,
        )
        .expect("token issues");

    let after_expiry = issued.expires + Duration::seconds(1);
    let verification = tokens
        .verify_at(after_expiry, &issued.token)
        .expect("verify runs");

    assert_eq!(verification, TokenVerification::Rejected);
}

#[test]
fn token_signed_with_a_different_secret_is_rejected() {
    let issued = ConsentTokenService::new("some-other-secret")
        .issue(consent_request_id(9), 14)
        .expect("token issues");

    let verification = service().verify(&issued.token).expect("verify runs");
    assert_eq!(verification, TokenVerification::Rejected);
}

#[test]
fn empty_token_is_an_invalid_argument() {
    match service().verify("") {
        Err(TokenError::EmptyToken) => {}
        other => panic!("expected empty token error, got {other:?}"),
    }
    match service().verify("   ") {
        Err(TokenError::EmptyToken) => {}
        other => panic!("expected empty token error, got {other:?}"),
    }
}

#[test]
fn malformed_token_is_rejected() {
    let verification = service().verify("not-a-token").expect("verify runs");
    assert_eq!(verification, TokenVerification::Rejected);
}

#[test]
fn tampered_claims_are_rejected() {
    let tokens = service();
    let issued = tokens.issue(consent_request_id(3), 14).expect("token issues");

    let segments: Vec<&str> = issued.token.split('.').collect();
    let payload = URL_SAFE_NO_PAD.decode(segments[1]).expect("payload decodes");
    let tampered_payload = String::from_utf8(payload)
        .expect("payload is utf8")
        .replace(&consent_request_id(3).to_string(), &consent_request_id(4).to_string());
    let tampered = format!(
        "{}.{}.{}",
        segments[0],
        URL_SAFE_NO_PAD.encode(tampered_payload),
        segments[2]
    );

    let verification = tokens.verify(&tampered).expect("verify runs");
    assert_eq!(verification, TokenVerification::Rejected);
}
