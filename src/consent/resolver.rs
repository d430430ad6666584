use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::directory::{ApplicationDirectory, DirectoryError};
use super::domain::{
    Application, AuditAttribution, ConsentRequestId, ConsentRequestSummary, SubStatus, SubmitterId,
};
use super::eligibility::{is_eligible, EligibilityError};
use super::notify::{
    ConsentMailer, EmailTransport, NotChosenEmailRequest, NotChosenEmailResult,
};

/// Error raised by the resolver. Read failures against the Applications
/// service are fatal to the current resolution; write and notification
/// failures are folded into result flags instead.
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),
}

/// Outcome of an attempt to register owner consent.
///
/// `ineligible` is reported distinctly so the caller can render a specific
/// message; every other failure collapses into `success: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterConsentOutcome {
    pub is_success: bool,
    pub is_ineligible: bool,
}

/// Property-owner feedback captured by the consent portal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFeedbackRequest {
    pub consent_request_id: ConsentRequestId,
    pub survey_option: i32,
    pub feedback_narrative: String,
}

/// Orchestrates consent resolution: eligibility, the winning registration,
/// sibling status transitions, and loser notification fan-out.
///
/// All iteration over a group is sequential per item; error aggregation
/// assumes single-threaded order. The resolver holds no state of its own
/// between calls.
pub struct ConsentResolver<D, T> {
    directory: Arc<D>,
    mailer: Arc<ConsentMailer<T>>,
}

impl<D, T> ConsentResolver<D, T>
where
    D: ApplicationDirectory + 'static,
    T: EmailTransport + 'static,
{
    pub fn new(directory: Arc<D>, mailer: Arc<ConsentMailer<T>>) -> Self {
        Self { directory, mailer }
    }

    pub async fn consent_request_summary(
        &self,
        consent_request_id: ConsentRequestId,
    ) -> Result<ConsentRequestSummary, ResolverError> {
        Ok(self
            .directory
            .consent_request_summary(consent_request_id)
            .await?)
    }

    /// The group of applications competing for the consent request's
    /// property. Grouping uses the UPRN; when none is on file the group
    /// degrades to the single application found by reference number, a
    /// weaker correlation key dependent on upstream data entry.
    pub async fn associated_applications(
        &self,
        consent_request_id: ConsentRequestId,
    ) -> Result<Vec<Application>, ResolverError> {
        let summary = self
            .directory
            .consent_request_summary(consent_request_id)
            .await?;

        match summary.uprn.as_deref().map(str::trim).filter(|uprn| !uprn.is_empty()) {
            Some(uprn) => Ok(self.directory.applications_by_uprn(uprn).await?),
            None => {
                let application = self
                    .directory
                    .application_by_reference(&summary.application_reference_number)
                    .await?;
                Ok(vec![application])
            }
        }
    }

    /// Registers owner consent for one consent request and reconciles every
    /// competing application on the property.
    ///
    /// An ineligible group short-circuits before any external mutation.
    /// Write failures after that point never abort the remaining steps; they
    /// only clear the success flag.
    pub async fn register_consent(
        &self,
        consent_request_id: ConsentRequestId,
    ) -> Result<RegisterConsentOutcome, ResolverError> {
        let applications = self.associated_applications(consent_request_id).await?;

        if !is_eligible(&applications)? {
            return Ok(RegisterConsentOutcome {
                is_success: false,
                is_ineligible: true,
            });
        }

        let winner = applications
            .iter()
            .find(|application| application.holds_consent_request(consent_request_id))
            .ok_or_else(|| {
                DirectoryError::NotFound(format!(
                    "no application holds consent request {consent_request_id}"
                ))
            })?;

        let attribution = AuditAttribution::for_application(winner);

        let mut registered = true;
        if let Err(error) = self
            .directory
            .register_consent_received(consent_request_id, &attribution.username, &attribution)
            .await
        {
            warn!(%consent_request_id, %error, "consent registration failed");
            registered = false;
        }

        let statuses_updated = self
            .handle_competing_applications(&applications, &attribution)
            .await;
        self.reject_losing_applications(&applications, consent_request_id)
            .await;

        Ok(RegisterConsentOutcome {
            is_success: registered && statuses_updated,
            is_ineligible: false,
        })
    }

    /// Moves every application in the group not already awaiting the owner's
    /// decision into consent review. No-op for groups of zero or one.
    ///
    /// Every member is attempted even after a failure; returns true only
    /// when no update reported an error.
    pub async fn handle_competing_applications(
        &self,
        applications: &[Application],
        attribution: &AuditAttribution,
    ) -> bool {
        if applications.len() <= 1 {
            return true;
        }

        let mut update_errors = Vec::new();

        for application in applications
            .iter()
            .filter(|application| application.sub_status != SubStatus::ConsentPending)
        {
            let attribution = attribution.for_entity(application.id);
            info!(
                application_id = %application.id,
                from = application.sub_status.label(),
                to = SubStatus::ConsentReview.label(),
                "parking competing application for review"
            );
            match self
                .directory
                .update_application_status(application.id, SubStatus::ConsentReview, &attribution)
                .await
            {
                Ok(errors) => update_errors.extend(errors),
                Err(error) => update_errors.push(error.to_string()),
            }
        }

        if !update_errors.is_empty() {
            warn!(
                errors = update_errors.len(),
                detail = %update_errors.join("; "),
                "competing application status updates reported failures"
            );
        }

        update_errors.is_empty()
    }

    /// Notifies the installer of every losing application that the owner
    /// consented elsewhere. Losers are the group members neither awaiting
    /// the owner's decision nor holding the winning consent request. One
    /// failed notification never stops the rest.
    pub async fn reject_losing_applications(
        &self,
        applications: &[Application],
        winning_consent_request_id: ConsentRequestId,
    ) {
        let losers = applications.iter().filter(|application| {
            application.sub_status != SubStatus::ConsentPending
                && !application.holds_consent_request(winning_consent_request_id)
        });

        for application in losers {
            let Some(consent_request) = application.consent_requests.first() else {
                warn!(application_id = %application.id, "losing application has no consent request to notify");
                continue;
            };

            if let Err(error) = self.send_consented_elsewhere_email(consent_request.id).await {
                warn!(application_id = %application.id, %error, "losing installer not notified");
            }
        }
    }

    /// Notifies every installer bidding on the application, except the one
    /// the owner chose, that they were not selected. Used when several
    /// installers compete on the same application rather than across
    /// applications. An empty remainder succeeds with no sends; lookup and
    /// send failures are isolated per recipient.
    pub async fn reject_competing_installers(
        &self,
        consent_request_id: ConsentRequestId,
    ) -> Result<NotChosenEmailResult, ResolverError> {
        let summary = self
            .directory
            .consent_request_summary(consent_request_id)
            .await?;
        let chosen_installer = summary.installer_email.clone();

        let applications = self.associated_applications(consent_request_id).await?;

        let mut submitters: Vec<SubmitterId> = Vec::new();
        for application in &applications {
            if !submitters.contains(&application.submitter_id) {
                submitters.push(application.submitter_id);
            }
        }

        let mut recipients = Vec::new();
        for submitter_id in submitters {
            match self.directory.business_account_email(submitter_id).await {
                Ok(email) => {
                    if email != chosen_installer && !recipients.contains(&email) {
                        recipients.push(email);
                    }
                }
                Err(error) => {
                    warn!(submitter_id = %submitter_id.0, %error, "installer email lookup failed");
                }
            }
        }

        for recipient in recipients {
            let request = NotChosenEmailRequest {
                installer_email_address: recipient,
                technology_type: summary.technology_type.clone(),
                address: summary.address.clone(),
            };
            let result = self.mailer.send_not_chosen_email(&request).await;
            if !result.is_success {
                warn!(recipient = %request.installer_email_address, "not-chosen email failed");
            }
        }

        Ok(NotChosenEmailResult { is_success: true })
    }

    /// Persists portal feedback against the current application. Any failure
    /// collapses to `false`; feedback is best-effort.
    pub async fn store_feedback(&self, feedback: &StoreFeedbackRequest) -> bool {
        match self.try_store_feedback(feedback).await {
            Ok(()) => true,
            Err(error) => {
                warn!(consent_request_id = %feedback.consent_request_id, %error, "feedback not stored");
                false
            }
        }
    }

    async fn try_store_feedback(&self, feedback: &StoreFeedbackRequest) -> Result<(), ResolverError> {
        let applications = self
            .associated_applications(feedback.consent_request_id)
            .await?;
        let application = applications
            .iter()
            .find(|application| application.holds_consent_request(feedback.consent_request_id))
            .ok_or_else(|| {
                DirectoryError::NotFound(format!(
                    "no application holds consent request {}",
                    feedback.consent_request_id
                ))
            })?;

        let attribution = AuditAttribution::for_application(application);

        let mut bag = BTreeMap::new();
        bag.insert("ApplicationId".to_string(), application.id.to_string());
        bag.insert(
            "FeedbackNarrative".to_string(),
            feedback.feedback_narrative.clone(),
        );
        bag.insert("SurveyOption".to_string(), feedback.survey_option.to_string());
        bag.insert("ServiceUsed".to_string(), attribution.user_type.clone());

        self.directory
            .store_service_feedback(bag, &attribution)
            .await?;
        Ok(())
    }

    async fn send_consented_elsewhere_email(
        &self,
        consent_request_id: ConsentRequestId,
    ) -> Result<(), ResolverError> {
        let summary = self
            .directory
            .consent_request_summary(consent_request_id)
            .await?;

        let request = NotChosenEmailRequest {
            installer_email_address: summary.installer_email,
            technology_type: summary.technology_type,
            address: summary.address,
        };

        let result = self.mailer.send_not_chosen_email(&request).await;
        if !result.is_success {
            warn!(%consent_request_id, "consented-elsewhere email failed");
        }
        Ok(())
    }
}
