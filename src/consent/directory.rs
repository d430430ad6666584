use std::collections::BTreeMap;

use async_trait::async_trait;

use super::domain::{
    Application, ApplicationId, AuditAttribution, ConsentRequestId, ConsentRequestSummary,
    SubStatus, SubmitterId,
};

/// Error enumeration for directory failures.
///
/// `NotFound` is fatal to the current resolution; `Unavailable` covers
/// transport-level failures against the Applications service.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{0}")]
    NotFound(String),
    #[error("applications service unavailable: {0}")]
    Unavailable(String),
}

/// Boundary to the external Applications service.
///
/// The service owns all application state; this trait exposes the reads and
/// status-mutation commands the resolver needs, so the engine can be
/// exercised against in-memory fakes.
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    /// Full consent-request details for portal display and email population.
    async fn consent_request_summary(
        &self,
        id: ConsentRequestId,
    ) -> Result<ConsentRequestSummary, DirectoryError>;

    /// Every application associated with a property site identifier.
    async fn applications_by_uprn(&self, uprn: &str) -> Result<Vec<Application>, DirectoryError>;

    /// Single-application lookup by human-entered reference number, used when
    /// no UPRN is on file.
    async fn application_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Application, DirectoryError>;

    /// Primary contact email for the installer account that submitted an
    /// application.
    async fn business_account_email(
        &self,
        submitter_id: SubmitterId,
    ) -> Result<String, DirectoryError>;

    /// Applies a status transition. Returns per-item error messages rather
    /// than failing, so callers can aggregate partial failures across a
    /// group; an empty list means the update succeeded.
    async fn update_application_status(
        &self,
        application_id: ApplicationId,
        status: SubStatus,
        attribution: &AuditAttribution,
    ) -> Result<Vec<String>, DirectoryError>;

    /// Marks consent received for a consent request, attributed to the
    /// supplied username.
    async fn register_consent_received(
        &self,
        id: ConsentRequestId,
        updated_by: &str,
        attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError>;

    /// Persists a free-form feedback bag. Fire-and-forget from the
    /// resolver's perspective.
    async fn store_service_feedback(
        &self,
        feedback: BTreeMap<String, String>,
        attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError>;
}
