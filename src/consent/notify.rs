use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::{ConsentRequestId, InstallationAddress};
use super::token::{ConsentTokenService, IssuedToken, TokenError, TokenVerification};

/// Error raised by the external email transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("email transport unavailable: {0}")]
    Transport(String),
}

/// Boundary to the transactional-email provider. The only observable
/// contract is per-send success or failure.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        template_id: &str,
        personalisation: &BTreeMap<String, String>,
    ) -> Result<(), TransportError>;
}

/// Template identifiers for the four consent emails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplates {
    pub consent_invitation: String,
    pub owner_confirmation: String,
    pub installer_confirmation: String,
    pub installer_not_chosen: String,
}

/// Validation failure for a consent email request.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    Required(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("email_address must be a valid email address")]
    InvalidEmail,
    #[error("expiry_days must be greater than zero")]
    InvalidExpiryDays,
}

/// Error raised when a consent email request cannot be attempted at all.
/// Transport failures are not errors; they surface as `is_success: false`.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Request to invite a property owner to grant consent.
///
/// `expiry_days` overrides the configured token validity; omitted means
/// the mailer's default applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConsentEmailRequest {
    pub consent_request_id: ConsentRequestId,
    #[serde(default)]
    pub expiry_days: Option<u32>,
    pub email_address: String,
    pub application_reference_number: String,
    pub installer_name: String,
    pub technology_type: String,
    pub address: InstallationAddress,
}

impl SendConsentEmailRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
            if value.trim().is_empty() {
                return Err(ValidationError::Required(field));
            }
            Ok(())
        }

        fn capped(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
            if value.chars().count() > max {
                return Err(ValidationError::TooLong { field, max });
            }
            Ok(())
        }

        required("application_reference_number", &self.application_reference_number)?;
        required("installer_name", &self.installer_name)?;
        required("technology_type", &self.technology_type)?;
        required("email_address", &self.email_address)?;
        if !self.email_address.contains('@') {
            return Err(ValidationError::InvalidEmail);
        }
        if self.expiry_days == Some(0) {
            return Err(ValidationError::InvalidExpiryDays);
        }

        required("address.line1", &self.address.line1)?;
        capped("address.line1", &self.address.line1, 127)?;
        capped("address.line2", &self.address.line2, 127)?;
        if let Some(line3) = &self.address.line3 {
            capped("address.line3", line3, 127)?;
        }
        capped("address.county", &self.address.county, 31)?;
        required("address.postcode", &self.address.postcode)?;
        capped("address.postcode", &self.address.postcode, 8)?;

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConsentEmailResult {
    pub is_success: bool,
    pub consent_request_id: Option<ConsentRequestId>,
    pub token_expires: Option<DateTime<Utc>>,
}

/// Request to confirm a registered consent to both parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConfirmationEmailRequest {
    pub consent_request_id: ConsentRequestId,
    pub owner_email_address: String,
    pub installer_email_address: String,
    pub application_reference_number: String,
    pub installer_name: String,
    pub technology_type: String,
    pub address: InstallationAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendConfirmationEmailResult {
    pub is_success: bool,
    pub consent_request_id: Option<ConsentRequestId>,
}

/// Request to notify an installer the owner consented elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotChosenEmailRequest {
    pub installer_email_address: String,
    pub technology_type: String,
    pub address: InstallationAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotChosenEmailResult {
    pub is_success: bool,
}

/// Sends the consent email suite through an [`EmailTransport`], isolating
/// delivery failure from the surrounding business transaction.
///
/// Also brackets the consent flow with the token service: the invitation
/// email mints the token, and the portal's verify step comes back through
/// [`ConsentMailer::verify_token`].
pub struct ConsentMailer<T> {
    transport: Arc<T>,
    templates: EmailTemplates,
    tokens: ConsentTokenService,
    portal_base_url: String,
    default_validity_days: u32,
}

impl<T> ConsentMailer<T>
where
    T: EmailTransport + 'static,
{
    pub fn new(
        transport: Arc<T>,
        templates: EmailTemplates,
        tokens: ConsentTokenService,
        portal_base_url: String,
        default_validity_days: u32,
    ) -> Self {
        Self {
            transport,
            templates,
            tokens,
            portal_base_url,
            default_validity_days,
        }
    }

    /// Mints a consent token and emails the owner an invitation carrying it.
    /// A transport failure yields `is_success: false` rather than an error.
    pub async fn send_consent_email(
        &self,
        request: &SendConsentEmailRequest,
    ) -> Result<SendConsentEmailResult, NotifyError> {
        request.validate()?;

        let validity_days = request.expiry_days.unwrap_or(self.default_validity_days);
        let issued = self
            .tokens
            .issue(request.consent_request_id, validity_days)?;
        let personalisation = self.consent_personalisation(request, &issued);

        if let Err(error) = self
            .transport
            .send(
                &request.email_address,
                &self.templates.consent_invitation,
                &personalisation,
            )
            .await
        {
            warn!(consent_request_id = %request.consent_request_id, %error, "consent email not sent");
            return Ok(SendConsentEmailResult {
                is_success: false,
                consent_request_id: None,
                token_expires: None,
            });
        }

        Ok(SendConsentEmailResult {
            is_success: true,
            consent_request_id: Some(request.consent_request_id),
            token_expires: Some(issued.expires),
        })
    }

    /// Confirms a registered consent to the owner, then the installer. A
    /// failure on either leg yields `is_success: false`.
    pub async fn send_confirmation_emails(
        &self,
        request: &SendConfirmationEmailRequest,
    ) -> SendConfirmationEmailResult {
        let personalisation = confirmation_personalisation(request);

        let legs = [
            (&request.owner_email_address, &self.templates.owner_confirmation),
            (
                &request.installer_email_address,
                &self.templates.installer_confirmation,
            ),
        ];

        for (recipient, template) in legs {
            if let Err(error) = self.transport.send(recipient, template, &personalisation).await {
                warn!(consent_request_id = %request.consent_request_id, %error, "confirmation email not sent");
                return SendConfirmationEmailResult {
                    is_success: false,
                    consent_request_id: None,
                };
            }
        }

        SendConfirmationEmailResult {
            is_success: true,
            consent_request_id: Some(request.consent_request_id),
        }
    }

    /// Tells one installer the owner gave consent elsewhere.
    pub async fn send_not_chosen_email(
        &self,
        request: &NotChosenEmailRequest,
    ) -> NotChosenEmailResult {
        let personalisation = not_chosen_personalisation(request);

        match self
            .transport
            .send(
                &request.installer_email_address,
                &self.templates.installer_not_chosen,
                &personalisation,
            )
            .await
        {
            Ok(()) => NotChosenEmailResult { is_success: true },
            Err(error) => {
                warn!(recipient = %request.installer_email_address, %error, "not-chosen email not sent");
                NotChosenEmailResult { is_success: false }
            }
        }
    }

    /// Validates a token clicked through from a consent email.
    pub fn verify_token(&self, token: &str) -> Result<TokenVerification, TokenError> {
        self.tokens.verify(token)
    }

    fn consent_personalisation(
        &self,
        request: &SendConsentEmailRequest,
        issued: &IssuedToken,
    ) -> BTreeMap<String, String> {
        let mut personalisation = BTreeMap::new();
        personalisation.insert(
            "ApplicationReferenceNumber".to_string(),
            request.application_reference_number.clone(),
        );
        personalisation.insert("InstallerName".to_string(), request.installer_name.clone());
        personalisation.insert("TechnologyType".to_string(), request.technology_type.clone());
        personalisation.insert("MultilineAddress".to_string(), request.address.multiline());
        personalisation.insert(
            "ServiceLevelAgreementDate".to_string(),
            issued.expires.format("%d %B %Y").to_string(),
        );
        personalisation.insert(
            "PropertyOwnerConsentURL".to_string(),
            format!("{}verify?token={}", self.portal_base_url, issued.token),
        );
        personalisation
    }
}

fn confirmation_personalisation(request: &SendConfirmationEmailRequest) -> BTreeMap<String, String> {
    let multiline = request.address.multiline();

    let mut personalisation = BTreeMap::new();
    personalisation.insert(
        "ApplicationReferenceNumber".to_string(),
        request.application_reference_number.clone(),
    );
    personalisation.insert("InstallerName".to_string(), request.installer_name.clone());
    personalisation.insert("TechnologyType".to_string(), request.technology_type.clone());
    // The live templates reference the address under three historic keys.
    personalisation.insert(
        "DisplayFriendlySingleLineInstallationAddress".to_string(),
        multiline.clone(),
    );
    personalisation.insert("MultiLineInstallationAddress".to_string(), multiline.clone());
    personalisation.insert("MultilineAddress".to_string(), multiline);
    personalisation.insert("Postcode".to_string(), request.address.postcode.clone());
    personalisation
}

fn not_chosen_personalisation(request: &NotChosenEmailRequest) -> BTreeMap<String, String> {
    let mut personalisation = BTreeMap::new();
    personalisation.insert(
        "InstallerEmail".to_string(),
        request.installer_email_address.clone(),
    );
    personalisation.insert("TechnologyType".to_string(), request.technology_type.clone());
    personalisation.insert("MultilineAddress".to_string(), request.address.multiline());
    personalisation.insert("Postcode".to_string(), request.address.postcode.clone());
    personalisation
}
