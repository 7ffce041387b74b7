//! Serial, rate-limited dispatch over an ordered contact list.
//!
//! One contact is in flight at a time. Each contact settles into exactly one
//! [`SendOutcome`] before the next is attempted, so a crash or abort can lose
//! at most the contact currently in flight. Failures are isolated per
//! contact, except session failures, which abort the remainder of the run.

use std::sync::atomic::{AtomicBool, Ordering};

use outreach_common::{
    config::CampaignConfig,
    contact::Contact,
    template::{TemplateRenderer, contact_context},
};
use tracing::{debug, info, warn};

use crate::authenticator::AuthenticatedProvider;
use crate::pacing::Pacing;
use crate::policy::RetryPolicy;
use crate::run::{CampaignRun, ErrorKind, SendOutcome};

/// Knobs for one dispatch pass.
#[derive(Clone, Copy, Debug)]
pub struct DispatchOptions {
    pub batch_size: usize,
    pub pacing: Pacing,
    pub retry: RetryPolicy,
}

impl DispatchOptions {
    #[must_use]
    pub const fn from_campaign(campaign: &CampaignConfig) -> Self {
        Self {
            batch_size: campaign.batch_size,
            pacing: Pacing::from_secs(campaign.inter_email_secs, campaign.inter_batch_secs),
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff_secs: 2,
                max_backoff_secs: 30,
            },
        }
    }
}

/// The requested batch size bounded by what the provider accepts.
pub(crate) fn effective_batch_size(requested: usize, provider_max: usize) -> usize {
    requested.clamp(1, provider_max.max(1))
}

enum Attempted {
    Settled(SendOutcome),
    SessionLost(SendOutcome),
}

pub struct Dispatcher {
    provider: AuthenticatedProvider,
    options: DispatchOptions,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(provider: AuthenticatedProvider, options: DispatchOptions) -> Self {
        Self { provider, options }
    }

    /// Send to every contact in order, one at a time.
    ///
    /// Every planned contact appears exactly once in the returned run, in
    /// input order. A session failure settles the in-flight contact with the
    /// session error and records the rest as aborted. Raising `cancel` stops
    /// the run at the next contact boundary.
    pub async fn dispatch(
        self,
        contacts: &[Contact],
        renderer: &dyn TemplateRenderer,
        cancel: &AtomicBool,
    ) -> CampaignRun {
        let started_at = chrono::Utc::now();
        let total = contacts.len();
        let batch_size =
            effective_batch_size(self.options.batch_size, self.provider.capabilities().max_batch_size);
        let mut outcomes: Vec<SendOutcome> = Vec::with_capacity(total);
        let mut aborted = false;

        info!(
            provider = %self.provider.kind(),
            contacts = total,
            batch_size,
            "dispatch started"
        );

        for (index, contact) in contacts.iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                warn!(remaining = total - index, "dispatch cancelled");
                abort_remaining(&mut outcomes, &contacts[index..], "cancelled by operator");
                aborted = true;
                break;
            }

            let context = contact_context(contact);
            let email = match renderer.render(&context) {
                Ok(email) => email,
                Err(e) => {
                    warn!(recipient = %contact.email, error = %e, "template render failed");
                    outcomes.push(SendOutcome::failed(
                        contact.email.clone(),
                        contact.display_name.clone(),
                        0,
                        ErrorKind::Render,
                        e.to_string(),
                    ));
                    self.pause(index, total, batch_size).await;
                    continue;
                }
            };

            match self.attempt(contact, &email).await {
                Attempted::Settled(outcome) => outcomes.push(outcome),
                Attempted::SessionLost(outcome) => {
                    outcomes.push(outcome);
                    abort_remaining(
                        &mut outcomes,
                        &contacts[index + 1..],
                        "delivery session lost",
                    );
                    aborted = true;
                    break;
                }
            }

            self.pause(index, total, batch_size).await;
        }

        let run = CampaignRun {
            provider: self.provider.kind(),
            total_contacts: total,
            batches_planned: total.div_ceil(batch_size),
            started_at,
            finished_at: chrono::Utc::now(),
            outcomes,
            aborted,
        };
        info!(
            sent = run.sent(),
            failed = run.failed(),
            aborted = run.aborted,
            "dispatch finished"
        );
        run
    }

    /// Run the attempt loop for one contact until it settles.
    async fn attempt(
        &self,
        contact: &Contact,
        email: &outreach_common::template::RenderedEmail,
    ) -> Attempted {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.provider.send(contact, email).await {
                Ok(receipt) => {
                    info!(recipient = %contact.email, message_id = %receipt.message_id, attempt, "sent");
                    return Attempted::Settled(SendOutcome::accepted(
                        contact.email.clone(),
                        contact.display_name.clone(),
                        attempt,
                        receipt.message_id,
                    ));
                }
                Err(e) if e.is_session() => {
                    warn!(recipient = %contact.email, error = %e, "session lost mid-send");
                    return Attempted::SessionLost(SendOutcome::failed(
                        contact.email.clone(),
                        contact.display_name.clone(),
                        attempt,
                        ErrorKind::Aborted,
                        e.to_string(),
                    ));
                }
                Err(e) if self.options.retry.should_retry(&e, attempt) => {
                    let backoff = self.options.retry.backoff(attempt);
                    debug!(
                        recipient = %contact.email,
                        error = %e,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(recipient = %contact.email, error = %e, attempt, "send failed");
                    return Attempted::Settled(SendOutcome::failed(
                        contact.email.clone(),
                        contact.display_name.clone(),
                        attempt,
                        ErrorKind::of(&e),
                        e.to_string(),
                    ));
                }
            }
        }
    }

    async fn pause(&self, index: usize, total: usize, batch_size: usize) {
        if let Some(pause) = self.options.pacing.pause_after(index, total, batch_size) {
            debug!(secs = pause.as_secs(), "pausing");
            tokio::time::sleep(pause).await;
        }
    }
}

fn abort_remaining(outcomes: &mut Vec<SendOutcome>, remaining: &[Contact], reason: &str) {
    for contact in remaining {
        outcomes.push(SendOutcome::failed(
            contact.email.clone(),
            contact.display_name.clone(),
            0,
            ErrorKind::Aborted,
            reason.to_string(),
        ));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use ahash::AHashMap;
    use outreach_common::address::Address;
    use outreach_common::template::{CompiledTemplate, RenderError, RenderedEmail};

    use super::*;
    use crate::error::{PermanentError, SendError, SessionError, TransientError};
    use crate::provider::{MockEmailProvider, ProviderCapabilities, ProviderKind, SendReceipt};
    use crate::run::OutcomeStatus;

    fn contact(raw: &str) -> Contact {
        Contact::new(Address::parse(raw).unwrap(), None, "Friend", AHashMap::default())
    }

    fn contacts(n: usize) -> Vec<Contact> {
        (0..n).map(|i| contact(&format!("c{i}@example.com"))).collect()
    }

    fn renderer() -> CompiledTemplate {
        CompiledTemplate::compile("Hello {first_name}", "<p>Hi {first_name}</p>", "Hi {first_name}")
            .unwrap()
    }

    fn options() -> DispatchOptions {
        DispatchOptions {
            batch_size: 50,
            pacing: Pacing::from_secs(0, 0),
            retry: RetryPolicy {
                max_attempts: 3,
                base_backoff_secs: 0,
                max_backoff_secs: 0,
            },
        }
    }

    fn base_mock() -> MockEmailProvider {
        let mut mock = MockEmailProvider::new();
        mock.expect_kind().return_const(ProviderKind::MailerSend);
        mock.expect_capabilities()
            .returning(|| ProviderCapabilities {
                name: "mailersend".to_string(),
                max_batch_size: 500,
                rate_limit_per_minute: 10,
            });
        mock
    }

    fn dispatcher(mock: MockEmailProvider) -> Dispatcher {
        Dispatcher::new(AuthenticatedProvider::new(Box::new(mock)), options())
    }

    struct FailingRenderer;

    impl TemplateRenderer for FailingRenderer {
        fn render(&self, _: &AHashMap<String, String>) -> Result<RenderedEmail, RenderError> {
            Err(RenderError::Failed("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_outcomes_preserve_input_order() {
        let mut mock = base_mock();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        mock.expect_send().times(3).returning(move |_, _| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            Ok(SendReceipt {
                message_id: format!("id-{n}"),
            })
        });

        let run = dispatcher(mock)
            .dispatch(&contacts(3), &renderer(), &AtomicBool::new(false))
            .await;

        assert_eq!(run.outcomes.len(), 3);
        assert!(!run.aborted);
        for (i, outcome) in run.outcomes.iter().enumerate() {
            assert_eq!(outcome.email.as_str(), format!("c{i}@example.com"));
            assert_eq!(
                outcome.status,
                OutcomeStatus::Accepted {
                    message_id: format!("id-{i}")
                }
            );
            assert_eq!(outcome.attempts, 1);
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_is_isolated() {
        let mut mock = base_mock();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        mock.expect_send().times(3).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(SendError::Permanent(PermanentError::InvalidRecipient(
                    "550".to_string(),
                )))
            } else {
                Ok(SendReceipt {
                    message_id: "id".to_string(),
                })
            }
        });

        let run = dispatcher(mock)
            .dispatch(&contacts(3), &renderer(), &AtomicBool::new(false))
            .await;

        assert_eq!(run.sent(), 2);
        assert_eq!(run.failed(), 1);
        assert!(!run.aborted);
        assert!(matches!(
            &run.outcomes[1].status,
            OutcomeStatus::Failed {
                kind: ErrorKind::Permanent,
                ..
            }
        ));
        // Permanent failures are never retried.
        assert_eq!(run.outcomes[1].attempts, 1);
        assert!(run.outcomes[2].status.is_accepted());
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_settles() {
        let mut mock = base_mock();
        mock.expect_send().times(3).returning(|_, _| {
            Err(SendError::Transient(TransientError::RateLimited(
                "429".to_string(),
            )))
        });

        let run = dispatcher(mock)
            .dispatch(&contacts(1), &renderer(), &AtomicBool::new(false))
            .await;

        assert_eq!(run.outcomes[0].attempts, 3);
        assert!(matches!(
            &run.outcomes[0].status,
            OutcomeStatus::Failed {
                kind: ErrorKind::Transient,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let mut mock = base_mock();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        mock.expect_send().times(3).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SendError::Transient(TransientError::Timeout(
                    "slow".to_string(),
                )))
            } else {
                Ok(SendReceipt {
                    message_id: "id".to_string(),
                })
            }
        });

        let run = dispatcher(mock)
            .dispatch(&contacts(1), &renderer(), &AtomicBool::new(false))
            .await;

        assert!(run.outcomes[0].status.is_accepted());
        assert_eq!(run.outcomes[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_session_loss_aborts_remaining_contacts() {
        let mut mock = base_mock();
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        mock.expect_send().times(2).returning(move |_, _| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(SendReceipt {
                    message_id: "id".to_string(),
                })
            } else {
                Err(SendError::Session(SessionError::SessionLost(
                    "401".to_string(),
                )))
            }
        });

        let run = dispatcher(mock)
            .dispatch(&contacts(4), &renderer(), &AtomicBool::new(false))
            .await;

        assert!(run.aborted);
        assert_eq!(run.outcomes.len(), 4);
        assert!(run.outcomes[0].status.is_accepted());
        // The in-flight contact carries the session error detail.
        assert!(matches!(
            &run.outcomes[1].status,
            OutcomeStatus::Failed {
                kind: ErrorKind::Aborted,
                detail,
            } if detail.contains("401")
        ));
        assert_eq!(run.outcomes[1].attempts, 1);
        for outcome in &run.outcomes[2..] {
            assert!(matches!(
                &outcome.status,
                OutcomeStatus::Failed {
                    kind: ErrorKind::Aborted,
                    ..
                }
            ));
            assert_eq!(outcome.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_cancellation_settles_remaining_as_aborted() {
        let mock = base_mock();
        let cancel = AtomicBool::new(true);

        let run = dispatcher(mock)
            .dispatch(&contacts(3), &renderer(), &cancel)
            .await;

        assert!(run.aborted);
        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(run.failures_of(ErrorKind::Aborted), 3);
    }

    #[tokio::test]
    async fn test_render_failure_does_not_stop_the_run() {
        let mut mock = base_mock();
        // The render never succeeds, so the provider is never called.
        mock.expect_send().times(0);

        let run = dispatcher(mock)
            .dispatch(&contacts(2), &FailingRenderer, &AtomicBool::new(false))
            .await;

        assert_eq!(run.outcomes.len(), 2);
        for outcome in &run.outcomes {
            assert!(matches!(
                &outcome.status,
                OutcomeStatus::Failed {
                    kind: ErrorKind::Render,
                    ..
                }
            ));
            assert_eq!(outcome.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_empty_contact_list_completes_immediately() {
        let mut mock = base_mock();
        mock.expect_send().times(0);

        let run = dispatcher(mock)
            .dispatch(&[], &renderer(), &AtomicBool::new(false))
            .await;

        assert!(run.outcomes.is_empty());
        assert!(!run.aborted);
    }

    #[tokio::test]
    async fn test_small_batches_complete_with_zero_delays() {
        let mut mock = base_mock();
        mock.expect_send().times(3).returning(|_, _| {
            Ok(SendReceipt {
                message_id: "id".to_string(),
            })
        });

        let mut options = options();
        options.batch_size = 2;
        let dispatcher = Dispatcher::new(
            AuthenticatedProvider::new(Box::new(mock)),
            options,
        );

        let run = dispatcher
            .dispatch(&contacts(3), &renderer(), &AtomicBool::new(false))
            .await;

        assert_eq!(run.total_contacts, 3);
        assert_eq!(run.batches_planned, 2);
        assert_eq!(run.sent(), 3);
        assert_eq!(run.outcomes.len(), run.total_contacts);
    }

    #[test]
    fn test_batch_size_clamps_to_provider_limit() {
        assert_eq!(effective_batch_size(50, 500), 50);
        assert_eq!(effective_batch_size(500, 100), 100);
        assert_eq!(effective_batch_size(0, 100), 1);
        assert_eq!(effective_batch_size(10, 0), 1);
    }
}
