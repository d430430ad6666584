use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use crate::consent::directory::{ApplicationDirectory, DirectoryError};
use crate::consent::domain::{
    Application, ApplicationId, AuditAttribution, ConsentRequest, ConsentRequestId,
    ConsentRequestSummary, InstallationAddress, PropertyOwnerContact, SubStatus, SubmitterId,
};
use crate::consent::notify::{ConsentMailer, EmailTemplates, EmailTransport, TransportError};
use crate::consent::resolver::ConsentResolver;
use crate::consent::router::ConsentState;
use crate::consent::token::ConsentTokenService;

pub(super) const TEST_SECRET: &str = "unit-test-signing-secret";
pub(super) const PORTAL_BASE_URL: &str = "https://consent.example.org/";
pub(super) const TEST_UPRN: &str = "100023336956";
pub(super) const DEFAULT_VALIDITY_DAYS: u32 = 14;

pub(super) fn consent_request_id(n: u128) -> ConsentRequestId {
    ConsentRequestId(Uuid::from_u128(n))
}

pub(super) fn application_id(n: u128) -> ApplicationId {
    ApplicationId(Uuid::from_u128(0x0a00 + n))
}

pub(super) fn submitter_id(n: u128) -> SubmitterId {
    SubmitterId(Uuid::from_u128(0x0b00 + n))
}

pub(super) fn consent_request(n: u128, received: bool) -> ConsentRequest {
    ConsentRequest {
        id: consent_request_id(n),
        consent_received: received
            .then(|| Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid date")),
    }
}

pub(super) fn address() -> InstallationAddress {
    InstallationAddress {
        line1: "12 Orchard Way".to_string(),
        line2: "Hunslet".to_string(),
        line3: None,
        county: "West Yorkshire".to_string(),
        postcode: "LS10 2QJ".to_string(),
    }
}

pub(super) fn application(n: u128, status: SubStatus, requests: Vec<ConsentRequest>) -> Application {
    Application {
        id: application_id(n),
        reference_number: format!("BUS{n:05}"),
        uprn: Some(TEST_UPRN.to_string()),
        sub_status: status,
        consent_requests: requests,
        property_owner: Some(PropertyOwnerContact {
            email: "owner@example.com".to_string(),
            full_name: "Sam Carter".to_string(),
        }),
        submitter_id: submitter_id(n),
    }
}

pub(super) fn installer_email(application: &Application) -> String {
    format!("installer+{}@example.com", application.reference_number)
}

fn summary_for(application: &Application, request: &ConsentRequest) -> ConsentRequestSummary {
    let owner = application.property_owner.clone().unwrap_or(PropertyOwnerContact {
        email: "owner@example.com".to_string(),
        full_name: "Sam Carter".to_string(),
    });

    ConsentRequestSummary {
        application_reference_number: application.reference_number.clone(),
        installer_name: "Warmline Heating Ltd".to_string(),
        installer_email: installer_email(application),
        owner_email: owner.email,
        owner_full_name: owner.full_name,
        technology_type: "Air Source Heat Pump".to_string(),
        address: address(),
        uprn: application.uprn.clone(),
        service_level_agreement_date: Utc
            .with_ymd_and_hms(2024, 4, 15, 0, 0, 0)
            .single()
            .expect("valid date"),
        expiry_date: Utc
            .with_ymd_and_hms(2024, 3, 15, 23, 59, 59)
            .single()
            .expect("valid date"),
        quote_amount: 8_500.0,
        has_consented: request.consent_received,
    }
}

/// In-memory stand-in for the external Applications service, recording
/// every command the resolver issues.
#[derive(Default)]
pub(super) struct MemoryDirectory {
    applications: Mutex<Vec<Application>>,
    summaries: Mutex<HashMap<ConsentRequestId, ConsentRequestSummary>>,
    emails: Mutex<HashMap<SubmitterId, String>>,
    status_updates: Mutex<Vec<(ApplicationId, SubStatus, String)>>,
    registered: Mutex<Vec<(ConsentRequestId, String)>>,
    feedback: Mutex<Vec<BTreeMap<String, String>>>,
    failing_status_updates: Mutex<HashSet<ApplicationId>>,
    failing_email_lookups: Mutex<HashSet<SubmitterId>>,
    failing_registration: Mutex<bool>,
}

impl MemoryDirectory {
    pub(super) fn push_application(&self, application: Application) {
        {
            let mut summaries = self.summaries.lock().expect("summaries mutex");
            for request in &application.consent_requests {
                summaries.insert(request.id, summary_for(&application, request));
            }
        }
        self.emails
            .lock()
            .expect("emails mutex")
            .insert(application.submitter_id, installer_email(&application));
        self.applications
            .lock()
            .expect("applications mutex")
            .push(application);
    }

    pub(super) fn set_submitter_email(&self, submitter_id: SubmitterId, email: &str) {
        self.emails
            .lock()
            .expect("emails mutex")
            .insert(submitter_id, email.to_string());
    }

    pub(super) fn fail_status_update(&self, application_id: ApplicationId) {
        self.failing_status_updates
            .lock()
            .expect("failing updates mutex")
            .insert(application_id);
    }

    pub(super) fn fail_email_lookup(&self, submitter_id: SubmitterId) {
        self.failing_email_lookups
            .lock()
            .expect("failing lookups mutex")
            .insert(submitter_id);
    }

    pub(super) fn fail_registration(&self) {
        *self.failing_registration.lock().expect("registration flag mutex") = true;
    }

    pub(super) fn status_updates(&self) -> Vec<(ApplicationId, SubStatus, String)> {
        self.status_updates.lock().expect("updates mutex").clone()
    }

    pub(super) fn registered(&self) -> Vec<(ConsentRequestId, String)> {
        self.registered.lock().expect("registered mutex").clone()
    }

    pub(super) fn feedback(&self) -> Vec<BTreeMap<String, String>> {
        self.feedback.lock().expect("feedback mutex").clone()
    }
}

#[async_trait]
impl ApplicationDirectory for MemoryDirectory {
    async fn consent_request_summary(
        &self,
        id: ConsentRequestId,
    ) -> Result<ConsentRequestSummary, DirectoryError> {
        self.summaries
            .lock()
            .expect("summaries mutex")
            .get(&id)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("consent request {id} not found")))
    }

    async fn applications_by_uprn(&self, uprn: &str) -> Result<Vec<Application>, DirectoryError> {
        Ok(self
            .applications
            .lock()
            .expect("applications mutex")
            .iter()
            .filter(|application| application.uprn.as_deref() == Some(uprn))
            .cloned()
            .collect())
    }

    async fn application_by_reference(
        &self,
        reference_number: &str,
    ) -> Result<Application, DirectoryError> {
        self.applications
            .lock()
            .expect("applications mutex")
            .iter()
            .find(|application| application.reference_number == reference_number)
            .cloned()
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("application {reference_number} not found"))
            })
    }

    async fn business_account_email(
        &self,
        submitter_id: SubmitterId,
    ) -> Result<String, DirectoryError> {
        if self
            .failing_email_lookups
            .lock()
            .expect("failing lookups mutex")
            .contains(&submitter_id)
        {
            return Err(DirectoryError::Unavailable(
                "email lookup failed".to_string(),
            ));
        }

        self.emails
            .lock()
            .expect("emails mutex")
            .get(&submitter_id)
            .cloned()
            .ok_or_else(|| {
                DirectoryError::NotFound(format!("submitter {} not found", submitter_id.0))
            })
    }

    async fn update_application_status(
        &self,
        application_id: ApplicationId,
        status: SubStatus,
        attribution: &AuditAttribution,
    ) -> Result<Vec<String>, DirectoryError> {
        self.status_updates.lock().expect("updates mutex").push((
            application_id,
            status,
            attribution.username.clone(),
        ));

        if self
            .failing_status_updates
            .lock()
            .expect("failing updates mutex")
            .contains(&application_id)
        {
            return Ok(vec![format!("status update failed for {application_id}")]);
        }

        Ok(Vec::new())
    }

    async fn register_consent_received(
        &self,
        id: ConsentRequestId,
        updated_by: &str,
        _attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError> {
        if *self.failing_registration.lock().expect("registration flag mutex") {
            return Err(DirectoryError::Unavailable(
                "consent registration failed".to_string(),
            ));
        }

        self.registered
            .lock()
            .expect("registered mutex")
            .push((id, updated_by.to_string()));
        Ok(())
    }

    async fn store_service_feedback(
        &self,
        feedback: BTreeMap<String, String>,
        _attribution: &AuditAttribution,
    ) -> Result<(), DirectoryError> {
        self.feedback.lock().expect("feedback mutex").push(feedback);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct SentEmail {
    pub recipient: String,
    pub template_id: String,
    pub personalisation: BTreeMap<String, String>,
}

/// In-memory transport recording both attempts and successful sends.
#[derive(Default)]
pub(super) struct MemoryTransport {
    sent: Mutex<Vec<SentEmail>>,
    attempted: Mutex<Vec<String>>,
    failing_recipients: Mutex<HashSet<String>>,
}

impl MemoryTransport {
    pub(super) fn fail_for(&self, recipient: &str) {
        self.failing_recipients
            .lock()
            .expect("failing recipients mutex")
            .insert(recipient.to_string());
    }

    pub(super) fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().expect("sent mutex").clone()
    }

    pub(super) fn attempted(&self) -> Vec<String> {
        self.attempted.lock().expect("attempted mutex").clone()
    }
}

#[async_trait]
impl EmailTransport for MemoryTransport {
    async fn send(
        &self,
        recipient: &str,
        template_id: &str,
        personalisation: &BTreeMap<String, String>,
    ) -> Result<(), TransportError> {
        self.attempted
            .lock()
            .expect("attempted mutex")
            .push(recipient.to_string());

        if self
            .failing_recipients
            .lock()
            .expect("failing recipients mutex")
            .contains(recipient)
        {
            return Err(TransportError::Transport("simulated outage".to_string()));
        }

        self.sent.lock().expect("sent mutex").push(SentEmail {
            recipient: recipient.to_string(),
            template_id: template_id.to_string(),
            personalisation: personalisation.clone(),
        });
        Ok(())
    }
}

pub(super) fn templates() -> EmailTemplates {
    EmailTemplates {
        consent_invitation: "consent-invitation".to_string(),
        owner_confirmation: "owner-confirmation".to_string(),
        installer_confirmation: "installer-confirmation".to_string(),
        installer_not_chosen: "installer-not-chosen".to_string(),
    }
}

pub(super) fn mailer(transport: Arc<MemoryTransport>) -> Arc<ConsentMailer<MemoryTransport>> {
    Arc::new(ConsentMailer::new(
        transport,
        templates(),
        ConsentTokenService::new(TEST_SECRET),
        PORTAL_BASE_URL.to_string(),
        DEFAULT_VALIDITY_DAYS,
    ))
}

pub(super) fn resolver(
    directory: Arc<MemoryDirectory>,
    transport: Arc<MemoryTransport>,
) -> ConsentResolver<MemoryDirectory, MemoryTransport> {
    ConsentResolver::new(directory, mailer(transport))
}

pub(super) fn consent_state(
    directory: Arc<MemoryDirectory>,
    transport: Arc<MemoryTransport>,
) -> Arc<ConsentState<MemoryDirectory, MemoryTransport>> {
    let mailer = mailer(transport);
    Arc::new(ConsentState {
        resolver: ConsentResolver::new(directory, mailer.clone()),
        mailer,
    })
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
