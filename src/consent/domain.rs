use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for applications held by the external Applications service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub Uuid);

/// Identifier wrapper for a single owner consent invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsentRequestId(pub Uuid);

/// Identifier for the installer account that submitted an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmitterId(pub Uuid);

impl std::fmt::Display for ConsentRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Workflow stage of an application, as tracked by the Applications service.
///
/// The terminal codes gate eligibility: a consented application in one of
/// them no longer blocks a new consent request for the same property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubStatus {
    Submitted,
    InReview,
    QualityControl,
    /// Awaiting the owner's decision. Left untouched by the resolver.
    ConsentPending,
    /// Sibling applications are parked here once another application wins.
    ConsentReview,
    Contracted,
    ValidationExpired,
    Rejected,
    Withdrawn,
    RejectionPending,
}

impl SubStatus {
    /// True for void/terminal codes this crate never enters.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            SubStatus::Contracted
                | SubStatus::ValidationExpired
                | SubStatus::Rejected
                | SubStatus::Withdrawn
                | SubStatus::RejectionPending
        )
    }

    pub const fn label(self) -> &'static str {
        match self {
            SubStatus::Submitted => "submitted",
            SubStatus::InReview => "in_review",
            SubStatus::QualityControl => "quality_control",
            SubStatus::ConsentPending => "consent_pending",
            SubStatus::ConsentReview => "consent_review",
            SubStatus::Contracted => "contracted",
            SubStatus::ValidationExpired => "validation_expired",
            SubStatus::Rejected => "rejected",
            SubStatus::Withdrawn => "withdrawn",
            SubStatus::RejectionPending => "rejection_pending",
        }
    }
}

/// One invitation for a property owner to grant or deny consent.
///
/// `consent_received` is never cleared once set; this crate treats a received
/// consent as final.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub id: ConsentRequestId,
    pub consent_received: Option<DateTime<Utc>>,
}

/// Contact details of the property owner, used for audit attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOwnerContact {
    pub email: String,
    pub full_name: String,
}

/// Snapshot of one installer's request to perform work at a property.
///
/// Created and mutated exclusively by the external Applications service;
/// instances here are read-only snapshots loaded per resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub reference_number: String,
    /// Property site identifier (UPRN). Absent when upstream data entry
    /// could not resolve the address, in which case applications correlate
    /// by reference number only.
    pub uprn: Option<String>,
    pub sub_status: SubStatus,
    pub consent_requests: Vec<ConsentRequest>,
    pub property_owner: Option<PropertyOwnerContact>,
    pub submitter_id: SubmitterId,
}

impl Application {
    /// Whether any consent request on this application has been accepted.
    pub fn has_received_consent(&self) -> bool {
        self.consent_requests
            .iter()
            .any(|request| request.consent_received.is_some())
    }

    pub fn holds_consent_request(&self, id: ConsentRequestId) -> bool {
        self.consent_requests.iter().any(|request| request.id == id)
    }
}

/// Postal address of the installation site, as captured on the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationAddress {
    pub line1: String,
    pub line2: String,
    pub line3: Option<String>,
    pub county: String,
    pub postcode: String,
}

impl InstallationAddress {
    /// Concatenates the non-blank address fields, one per line, without a
    /// trailing newline. Used to populate email templates.
    pub fn multiline(&self) -> String {
        let fields = [
            Some(self.line1.as_str()),
            Some(self.line2.as_str()),
            self.line3.as_deref(),
            Some(self.county.as_str()),
            Some(self.postcode.as_str()),
        ];

        fields
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// All data needed to show a consent request to the property owner and to
/// populate the related emails. Returned by the Applications directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentRequestSummary {
    pub application_reference_number: String,
    pub installer_name: String,
    pub installer_email: String,
    pub owner_email: String,
    pub owner_full_name: String,
    pub technology_type: String,
    pub address: InstallationAddress,
    pub uprn: Option<String>,
    pub service_level_agreement_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub quote_amount: f64,
    pub has_consented: Option<DateTime<Utc>>,
}

/// Sentinel username recorded when the owner contact is missing.
pub const UNKNOWN_USER: &str = "Unknown User";

/// Audit metadata attached to every mutation issued to the Applications
/// service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAttribution {
    pub entity_reference_id: ApplicationId,
    pub username: String,
    pub user_type: String,
}

impl AuditAttribution {
    /// Attributes a change to the application's recorded owner, falling back
    /// to [`UNKNOWN_USER`] when no contact is on file.
    pub fn for_application(application: &Application) -> Self {
        let username = application
            .property_owner
            .as_ref()
            .map(|owner| owner.email.clone())
            .unwrap_or_else(|| UNKNOWN_USER.to_string());

        Self {
            entity_reference_id: application.id,
            username,
            user_type: "Consent".to_string(),
        }
    }

    /// The same attribution pointed at a different application, used when a
    /// group update fans out over siblings.
    pub fn for_entity(&self, entity: ApplicationId) -> Self {
        Self {
            entity_reference_id: entity,
            ..self.clone()
        }
    }
}
