//! The consent resolution engine: eligibility across competing applications,
//! the status-transition algorithm run when one application wins consent,
//! the signed expiring consent token, and fault-isolated notification
//! dispatch.

pub mod directory;
pub mod domain;
pub mod eligibility;
pub mod notify;
pub mod resolver;
pub mod router;
pub mod token;

#[cfg(test)]
mod tests;

pub use directory::{ApplicationDirectory, DirectoryError};
pub use domain::{
    Application, ApplicationId, AuditAttribution, ConsentRequest, ConsentRequestId,
    ConsentRequestSummary, InstallationAddress, PropertyOwnerContact, SubStatus, SubmitterId,
    UNKNOWN_USER,
};
pub use eligibility::{is_eligible, EligibilityError};
pub use notify::{
    ConsentMailer, EmailTemplates, EmailTransport, NotChosenEmailRequest, NotChosenEmailResult,
    NotifyError, SendConfirmationEmailRequest, SendConfirmationEmailResult,
    SendConsentEmailRequest, SendConsentEmailResult, TransportError, ValidationError,
};
pub use resolver::{ConsentResolver, RegisterConsentOutcome, ResolverError, StoreFeedbackRequest};
pub use router::{consent_router, ConsentState};
pub use token::{ConsentTokenService, IssuedToken, TokenError, TokenVerification};
