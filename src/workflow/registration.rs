use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Conflict, Error, Result};
use crate::model::identity::{
    Identity, IdentityCore, PasswordCredential, RegistrationForm, ValidForm,
};
use crate::model::otp::{Challenge, CodeCheck};
use crate::notify::{Delivery, Message, Notifier};
use crate::store::{InsertError, Store, UniquenessReport};
use crate::wallet::{self, WalletProvider};

/// Stages of the registration state machine. `CollectingInfo` is the
/// initial state, `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    CollectingInfo,
    AwaitingCode,
    AwaitingWallet,
    Complete,
}

impl Default for Stage {
    fn default() -> Self {
        Self::CollectingInfo
    }
}

/// Ephemeral per-registrant session state, owned by the workflow and
/// independent of any rendering concern. Never persisted: abandoning it
/// restarts registration from `CollectingInfo`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationSession {
    stage: Stage,
    form: Option<ValidForm>,
    challenge: Option<Challenge>,
}

impl RegistrationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The validated form retained across steps (and across backwards
    /// navigation), if one has been submitted.
    pub fn form(&self) -> Option<&ValidForm> {
        self.form.as_ref()
    }

    /// The currently issued challenge, if any.
    pub fn challenge(&self) -> Option<&Challenge> {
        self.challenge.as_ref()
    }
}

/// Drives a [`RegistrationSession`] through
/// `CollectingInfo → AwaitingCode → AwaitingWallet → Complete`.
pub struct RegistrationWorkflow<'a, S, N> {
    store: &'a S,
    notifier: &'a N,
    config: &'a Config,
}

impl<'a, S: Store, N: Notifier> RegistrationWorkflow<'a, S, N> {
    pub fn new(store: &'a S, notifier: &'a N, config: &'a Config) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Leave `CollectingInfo`: validate every field together, run the
    /// advisory uniqueness check, issue a verification code, and request
    /// its delivery. On success the session is in `AwaitingCode`.
    ///
    /// Delivery failure does not fail issuance; it is reported as
    /// [`Delivery::Uncertain`] so the caller can offer another channel.
    pub async fn submit_info(
        &self,
        session: &mut RegistrationSession,
        form: &RegistrationForm,
    ) -> Result<Delivery> {
        self.expect_stage(session, Stage::CollectingInfo)?;

        let valid = form.validate().map_err(Error::Validation)?;

        // Advisory only: the insert constraint at completion remains the
        // authoritative guard against registration races.
        let report = self
            .store
            .check_uniqueness(&valid.email, &valid.external_id)
            .await?;
        if let Some(conflict) = conflict_from_report(report) {
            return Err(Error::Conflict(conflict));
        }

        let challenge = Challenge::issue();
        let delivery = self.send_code(&valid, &challenge).await;

        session.form = Some(valid);
        session.challenge = Some(challenge);
        session.stage = Stage::AwaitingCode;
        info!("registration advanced to AwaitingCode");
        Ok(delivery)
    }

    /// Issue a replacement code, invalidating the previous one, and
    /// request its delivery again.
    pub async fn resend_code(&self, session: &mut RegistrationSession) -> Result<Delivery> {
        self.expect_stage(session, Stage::AwaitingCode)?;

        let form = session
            .form
            .clone()
            .expect("form is set in every stage past CollectingInfo");
        let challenge = session
            .challenge
            .as_mut()
            .expect("challenge is issued on entering AwaitingCode");
        challenge.reissue();
        let challenge = challenge.clone();
        Ok(self.send_code(&form, &challenge).await)
    }

    /// Check the submitted code. `Valid` advances to `AwaitingWallet`;
    /// `Mismatch` leaves the session where it is.
    pub fn submit_code(&self, session: &mut RegistrationSession, submitted: &str) -> Result<()> {
        self.expect_stage(session, Stage::AwaitingCode)?;

        let challenge = session
            .challenge
            .as_ref()
            .expect("challenge is issued on entering AwaitingCode");
        match challenge.check(submitted) {
            CodeCheck::Valid => {
                session.stage = Stage::AwaitingWallet;
                info!("registration advanced to AwaitingWallet");
                Ok(())
            }
            CodeCheck::Mismatch => Err(Error::CodeMismatch),
        }
    }

    /// Complete registration, in order: (a) create the durable account
    /// credential, (b) obtain the wallet address from the provider,
    /// (c) insert the verified identity with the bound address, (d) request
    /// the welcome notification. Any failure leaves the session in
    /// `AwaitingWallet` so the user can retry.
    pub async fn connect_wallet<W: WalletProvider>(
        &self,
        session: &mut RegistrationSession,
        provider: &W,
    ) -> Result<Identity> {
        self.expect_stage(session, Stage::AwaitingWallet)?;

        let form = session
            .form
            .clone()
            .expect("form is set in every stage past CollectingInfo");

        // (a) Durable credential. Reported as a generic failure so the
        // caller cannot tell which completion step broke.
        let credential =
            PasswordCredential::derive(&form.password).map_err(|_| Error::AccountCreation)?;
        let credential_id = self
            .store
            .insert_credential(&form.email, credential)
            .await
            .map_err(|err| {
                warn!("credential creation failed: {err}");
                Error::AccountCreation
            })?;

        // (b) Wallet binding via the external provider.
        let address = wallet::obtain_address(provider).await?;

        // (c) The verified identity, written atomically with its unique
        // constraints; `verified` is never false in a stored record.
        let identity = IdentityCore::verified(&form, credential_id, address);
        let identity = match self.store.insert_identity(identity).await {
            Ok(identity) => identity,
            Err(InsertError::Constraint(index)) => {
                // The advisory check passed but another registrant won the
                // race; attribute the conflict exactly as the advisory
                // check would have.
                warn!("late uniqueness conflict on {index:?}");
                return Err(Error::Conflict(index.into()));
            }
            Err(InsertError::Store(err)) => {
                // The credential from (a) outlives the failed insert; there
                // is no compensating delete.
                warn!("identity insert failed, credential {credential_id} is orphaned: {err}");
                return Err(err.into());
            }
        };

        // (d) Welcome notification; delivery failure never fails
        // completion.
        let message = Message::welcome(self.config, &identity.email, &identity.full_name);
        if let Err(err) = self.notifier.send(message).await {
            warn!("welcome notification failed for identity {}: {err}", identity.id);
        }

        session.stage = Stage::Complete;
        session.challenge = None;
        info!("registration complete for identity {}", identity.id);
        Ok(identity)
    }

    /// Navigate back one step. Form data and any issued challenge are
    /// retained so the user can move forward again without re-entry.
    /// `Complete` is terminal and `CollectingInfo` is the floor.
    pub fn step_back(&self, session: &mut RegistrationSession) {
        session.stage = match session.stage {
            Stage::CollectingInfo => Stage::CollectingInfo,
            Stage::AwaitingCode => Stage::CollectingInfo,
            Stage::AwaitingWallet => Stage::AwaitingCode,
            Stage::Complete => Stage::Complete,
        };
    }

    fn expect_stage(&self, session: &RegistrationSession, expected: Stage) -> Result<()> {
        if session.stage == expected {
            Ok(())
        } else {
            Err(Error::InvalidStage(session.stage))
        }
    }

    async fn send_code(&self, form: &ValidForm, challenge: &Challenge) -> Delivery {
        let message = Message::verification_code(self.config, &form.email, challenge.code());
        match self.notifier.send(message).await {
            Ok(()) => Delivery::Sent,
            Err(err) => {
                // The code is issued regardless; only delivery is in doubt.
                warn!("verification code delivery failed: {err}");
                Delivery::Uncertain
            }
        }
    }
}

/// Attribute an advisory-check hit to the field(s) that collided.
fn conflict_from_report(report: UniquenessReport) -> Option<Conflict> {
    match (report.email_taken, report.external_id_taken) {
        (true, true) => Some(Conflict::EmailAndExternalId),
        (true, false) => Some(Conflict::Email),
        (false, true) => Some(Conflict::ExternalId),
        (false, false) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::RecordingNotifier;
    use crate::store::testing::RiggedStore;
    use crate::store::MemoryStore;
    use crate::wallet::testing::{ApprovingProvider, DecliningProvider};
    use crate::wallet::WalletAddress;

    fn workflow<'a>(
        store: &'a MemoryStore,
        notifier: &'a RecordingNotifier,
        config: &'a Config,
    ) -> RegistrationWorkflow<'a, MemoryStore, RecordingNotifier> {
        RegistrationWorkflow::new(store, notifier, config)
    }

    /// Submit the current challenge's code, as the user would after
    /// reading it from the notification.
    fn issued_code(session: &RegistrationSession) -> String {
        session.challenge().unwrap().code().to_string()
    }

    #[tokio::test]
    async fn full_registration_reaches_complete() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        let delivery = workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(session.stage(), Stage::AwaitingCode);

        // The code in the notification matches the issued challenge.
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains(&issued_code(&session)));

        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();
        assert_eq!(session.stage(), Stage::AwaitingWallet);

        let provider = ApprovingProvider(WalletAddress::example());
        let identity = workflow
            .connect_wallet(&mut session, &provider)
            .await
            .unwrap();
        assert_eq!(session.stage(), Stage::Complete);
        assert!(identity.verified);
        assert_eq!(identity.wallet_address, Some(WalletAddress::example()));

        // Persisted, retrievable, and greeted.
        let stored = store
            .identity_by_email("ada@example.org")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, identity.id);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].subject.contains("Welcome"));
    }

    #[tokio::test]
    async fn invalid_form_reports_every_field_and_stays_put() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        let form = RegistrationForm {
            full_name: String::new(),
            email: "nope".to_string(),
            phone: "nope".to_string(),
            external_id: "no".to_string(),
            password: "no".to_string(),
            confirm_password: "nah".to_string(),
        };
        let err = workflow.submit_info(&mut session, &form).await.unwrap_err();
        match err {
            Error::Validation(errors) => assert_eq!(errors.len(), 6),
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(session.stage(), Stage::CollectingInfo);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn advisory_conflicts_are_field_attributed() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);

        // Complete a first registration for Ada.
        let mut session = RegistrationSession::new();
        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();
        workflow
            .connect_wallet(&mut session, &ApprovingProvider(WalletAddress::example()))
            .await
            .unwrap();

        // Same external id, different email: attributed to the external id
        // only.
        let mut form = RegistrationForm::example2();
        form.external_id = "STU123456".to_string();
        let mut session = RegistrationSession::new();
        let err = workflow.submit_info(&mut session, &form).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::ExternalId)));

        // Same email, different external id.
        let mut form = RegistrationForm::example2();
        form.email = "ada@example.org".to_string();
        let mut session = RegistrationSession::new();
        let err = workflow.submit_info(&mut session, &form).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::Email)));

        // Both taken: both reported.
        let mut session = RegistrationSession::new();
        let err = workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::EmailAndExternalId)));
    }

    #[tokio::test]
    async fn wrong_code_does_not_advance() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();

        let issued = issued_code(&session);
        let wrong = if issued == "000000" { "000001" } else { "000000" };
        assert!(matches!(
            workflow.submit_code(&mut session, wrong),
            Err(Error::CodeMismatch)
        ));
        assert!(matches!(
            workflow.submit_code(&mut session, ""),
            Err(Error::CodeMismatch)
        ));
        assert_eq!(session.stage(), Stage::AwaitingCode);

        // The correct code still works afterwards: no attempt limit.
        workflow.submit_code(&mut session, &issued).unwrap();
        assert_eq!(session.stage(), Stage::AwaitingWallet);
    }

    #[tokio::test]
    async fn resend_reissues_and_renotifies() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let delivery = workflow.resend_code(&mut session).await.unwrap();
        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(session.stage(), Stage::AwaitingCode);

        // Two verification messages, the second carrying the current code.
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].body.contains(&issued_code(&session)));

        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();
        assert_eq!(session.stage(), Stage::AwaitingWallet);
    }

    #[tokio::test]
    async fn delivery_failure_is_degraded_success() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        notifier.fail_sends();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        let delivery = workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Uncertain);
        // The code was issued and the session advanced regardless.
        assert_eq!(session.stage(), Stage::AwaitingCode);
        assert!(session.challenge().is_some());
    }

    #[tokio::test]
    async fn welcome_failure_still_completes() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();

        notifier.fail_sends();
        let identity = workflow
            .connect_wallet(&mut session, &ApprovingProvider(WalletAddress::example()))
            .await
            .unwrap();
        assert_eq!(session.stage(), Stage::Complete);
        assert!(identity.verified);
    }

    #[tokio::test]
    async fn back_navigation_retains_form_data() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();
        assert_eq!(session.stage(), Stage::AwaitingWallet);

        workflow.step_back(&mut session);
        assert_eq!(session.stage(), Stage::AwaitingCode);
        workflow.step_back(&mut session);
        assert_eq!(session.stage(), Stage::CollectingInfo);
        assert!(session.form().is_some());
        // The floor: stepping back again stays put.
        workflow.step_back(&mut session);
        assert_eq!(session.stage(), Stage::CollectingInfo);

        // Moving forward again re-runs the normal transitions.
        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        assert_eq!(session.stage(), Stage::AwaitingCode);
    }

    #[tokio::test]
    async fn declined_wallet_keeps_session_retryable() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();

        let err = workflow
            .connect_wallet(&mut session, &DecliningProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WalletDeclined));
        assert_eq!(session.stage(), Stage::AwaitingWallet);

        // Retrying with approval completes; the earlier credential write is
        // replaced, not duplicated.
        let identity = workflow
            .connect_wallet(&mut session, &ApprovingProvider(WalletAddress::example()))
            .await
            .unwrap();
        assert!(identity.verified);
        assert_eq!(store.credential_count(), 1);
    }

    #[tokio::test]
    async fn late_constraint_maps_to_the_same_conflict() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);

        // Two racing sessions both pass the advisory check before either
        // completes.
        let mut first = RegistrationSession::new();
        workflow
            .submit_info(&mut first, &RegistrationForm::example())
            .await
            .unwrap();
        let mut form = RegistrationForm::example();
        form.external_id = "STU777777".to_string();
        let mut second = RegistrationSession::new();
        workflow.submit_info(&mut second, &form).await.unwrap();

        let code = issued_code(&first);
        workflow.submit_code(&mut first, &code).unwrap();
        let code = issued_code(&second);
        workflow.submit_code(&mut second, &code).unwrap();

        workflow
            .connect_wallet(&mut first, &ApprovingProvider(WalletAddress::example()))
            .await
            .unwrap();

        // The loser sees the same field-attributed conflict an early
        // advisory hit would have produced.
        let err = workflow
            .connect_wallet(&mut second, &ApprovingProvider(WalletAddress::example2()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::Email)));
        assert_eq!(second.stage(), Stage::AwaitingWallet);
    }

    #[tokio::test]
    async fn failed_identity_insert_orphans_the_credential() {
        let store = RiggedStore::new().fail_identity_inserts();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = RegistrationWorkflow::new(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        workflow
            .submit_info(&mut session, &RegistrationForm::example())
            .await
            .unwrap();
        let code = issued_code(&session);
        workflow.submit_code(&mut session, &code).unwrap();

        let err = workflow
            .connect_wallet(&mut session, &ApprovingProvider(WalletAddress::example()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert_eq!(session.stage(), Stage::AwaitingWallet);
        // The credential row survives the failed insert.
        assert_eq!(store.inner.credential_count(), 1);
        assert!(store
            .inner
            .identity_by_email("ada@example.org")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn operations_reject_the_wrong_stage() {
        let store = MemoryStore::new();
        let notifier = RecordingNotifier::new();
        let config = Config::default();
        let workflow = workflow(&store, &notifier, &config);
        let mut session = RegistrationSession::new();

        assert!(matches!(
            workflow.submit_code(&mut session, "123456"),
            Err(Error::InvalidStage(Stage::CollectingInfo))
        ));
        assert!(matches!(
            workflow.resend_code(&mut session).await,
            Err(Error::InvalidStage(Stage::CollectingInfo))
        ));
        assert!(matches!(
            workflow
                .connect_wallet(&mut session, &DecliningProvider)
                .await,
            Err(Error::InvalidStage(Stage::CollectingInfo))
        ));
    }
}
