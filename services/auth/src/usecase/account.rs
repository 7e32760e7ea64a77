use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use ridepool_auth_types::guard::ensure_verified;
use ridepool_auth_types::token::decode_token;
use ridepool_domain::account::{AccountStatus, VerificationRequirement};
use ridepool_domain::channel::Channel;
use ridepool_domain::device::DeviceInfo;
use ridepool_domain::id::UserId;

use crate::domain::repository::{
    AccountPort, AuditLog, EphemeralStore, MessageSender, SessionAudit,
};
use crate::domain::types::{
    Account, AuthEvent, EndReason, IssuedCode, OtcVerification, RateLimitPurpose, SecurityEvent,
    SecurityEventType, SessionTokens, Severity,
};
use crate::error::AuthServiceError;
use crate::usecase::lockout::LockoutGuard;
use crate::usecase::otc::OtcManager;
use crate::usecase::rate_limit::RateLimiter;
use crate::usecase::risk::RiskMonitor;
use crate::usecase::session::SessionManager;

fn code_message(issued: &IssuedCode) -> String {
    let minutes = (issued.expires_at - Utc::now()).num_minutes().max(1);
    format!(
        "Your verification code is {}. It expires in {minutes} minutes.",
        issued.code
    )
}

/// Hand the code to the delivery channel. The code stays valid if delivery fails.
async fn deliver<M: MessageSender>(messages: &M, channel: &Channel, issued: &IssuedCode) {
    match messages.send(channel, &code_message(issued)).await {
        Ok(delivery_id) => info!(channel = %channel, delivery_id, "code delivered"),
        Err(e) => warn!(error = %e, channel = %channel, "code delivery failed"),
    }
}

/// Status after verifying the mobile number: active once email is verified too.
fn status_after_verification(account: &Account) -> AccountStatus {
    match account.status {
        AccountStatus::Suspended => AccountStatus::Suspended,
        _ if account.flags.fully_verified() => AccountStatus::Active,
        _ => AccountStatus::PendingEmail,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodePurpose {
    Register,
    Login,
}

impl CodePurpose {
    fn rate_limit(self) -> RateLimitPurpose {
        match self {
            Self::Register => RateLimitPurpose::OtcRequest,
            Self::Login => RateLimitPurpose::LoginAttempt,
        }
    }

    fn excess_activity(self) -> &'static str {
        match self {
            Self::Register => "EXCESSIVE_REGISTRATION_ATTEMPTS",
            Self::Login => "EXCESSIVE_LOGIN_ATTEMPTS",
        }
    }
}

pub struct RequestCodeInput {
    pub phone: String,
    pub purpose: CodePurpose,
}

#[derive(Debug, Serialize)]
pub struct CodeRequested {
    pub identifier: String,
    pub expires_at: DateTime<Utc>,
}

/// Start a registration or login by sending a one-time code to the phone number.
pub struct RequestCodeUseCase<S, L, U, M>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    M: MessageSender,
{
    pub limiter: RateLimiter<S>,
    pub lockout: LockoutGuard<S, L>,
    pub otc: OtcManager<S, L>,
    pub accounts: U,
    pub messages: M,
    pub default_country_code: String,
}

impl<S, L, U, M> RequestCodeUseCase<S, L, U, M>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    M: MessageSender,
{
    pub async fn execute(&self, input: RequestCodeInput) -> Result<CodeRequested, AuthServiceError> {
        let channel = Channel::phone(&input.phone, &self.default_country_code)?;
        let identifier = channel.address();

        if self.lockout.is_locked(identifier).await? {
            return Err(AuthServiceError::AccountLocked);
        }
        if !self
            .limiter
            .allow_purpose(input.purpose.rate_limit(), identifier)
            .await
        {
            self.lockout
                .track_suspicious_activity(identifier, input.purpose.excess_activity())
                .await?;
            return Err(AuthServiceError::RateLimitExceeded);
        }

        let existing = self.accounts.find_by_phone(identifier).await?;
        match (input.purpose, existing) {
            (CodePurpose::Register, Some(account)) if account.flags.mobile_verified => {
                return Err(AuthServiceError::AccountAlreadyExists);
            }
            (CodePurpose::Register, Some(_)) => {}
            (CodePurpose::Register, None) => {
                let account = self.accounts.create(identifier).await?;
                info!(user_id = %account.id, "pending account created");
            }
            (CodePurpose::Login, None) => return Err(AuthServiceError::AccountNotFound),
            (CodePurpose::Login, Some(account)) if account.status == AccountStatus::Suspended => {
                return Err(AuthServiceError::AccountSuspended);
            }
            (CodePurpose::Login, Some(_)) => {}
        }

        let issued = self.otc.issue(&channel).await?;
        deliver(&self.messages, &channel, &issued).await;

        Ok(CodeRequested {
            identifier: channel.masked(),
            expires_at: issued.expires_at,
        })
    }
}

pub struct VerifyCodeInput {
    pub phone: String,
    pub code: String,
    pub device: DeviceInfo,
    pub source_address: Option<String>,
}

/// Exchange a correct code for a session.
pub struct VerifyCodeUseCase<S, L, U, A>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    A: SessionAudit,
{
    pub lockout: LockoutGuard<S, L>,
    pub otc: OtcManager<S, L>,
    pub sessions: SessionManager<S, A>,
    pub accounts: U,
    pub audit: L,
    pub risk: RiskMonitor,
    pub default_country_code: String,
}

impl<S, L, U, A> VerifyCodeUseCase<S, L, U, A>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    A: SessionAudit,
{
    pub async fn execute(&self, input: VerifyCodeInput) -> Result<SessionTokens, AuthServiceError> {
        let channel = Channel::phone(&input.phone, &self.default_country_code)?;
        let identifier = channel.address();

        if self.lockout.is_locked(identifier).await? {
            return Err(AuthServiceError::AccountLocked);
        }
        let mut account = self
            .accounts
            .find_by_phone(identifier)
            .await?
            .ok_or(AuthServiceError::AccountNotFound)?;
        if account.status == AccountStatus::Suspended {
            return Err(AuthServiceError::AccountSuspended);
        }

        if let OtcVerification::Rejected { remaining_attempts } =
            self.otc.verify(&channel, &input.code).await?
        {
            let locked = self
                .lockout
                .record_failed_attempt(identifier, "OTC_VERIFICATION")
                .await?;
            if let Some(ip) = input.source_address.as_deref() {
                self.lockout
                    .record_ip_failed_attempt(ip, "OTC_VERIFICATION")
                    .await?;
            }
            self.audit.record(
                SecurityEvent::new(
                    SecurityEventType::LoginFailure,
                    Severity::Medium,
                    "incorrect code",
                )
                .user(account.id)
                .identifier(identifier),
            );
            if locked {
                return Err(AuthServiceError::AccountLocked);
            }
            return Err(AuthServiceError::InvalidCode { remaining_attempts });
        }

        self.lockout.clear_failed_attempts(identifier).await?;
        self.otc.delete(&channel).await?;
        if !account.flags.mobile_verified {
            account.flags.mobile_verified = true;
            account.status = status_after_verification(&account);
            self.accounts.save(&account).await?;
        }

        self.audit.record(
            SecurityEvent::new(SecurityEventType::LoginSuccess, Severity::Low, "code verified")
                .user(account.id)
                .identifier(identifier),
        );
        self.risk.submit(AuthEvent {
            user_id: account.id,
            identifier: identifier.to_owned(),
            source_address: input
                .source_address
                .clone()
                .or_else(|| input.device.ip_address.clone()),
            user_agent: input.device.user_agent.clone(),
            device_attributes: input.device.attributes(),
            occurred_at: Utc::now(),
        });

        self.sessions.create_session(&account, input.device).await
    }
}

/// Verify an email address for an account whose mobile number is already verified.
pub struct EmailVerificationUseCase<S, L, U, M>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    M: MessageSender,
{
    pub lockout: LockoutGuard<S, L>,
    pub otc: OtcManager<S, L>,
    pub accounts: U,
    pub messages: M,
}

impl<S, L, U, M> EmailVerificationUseCase<S, L, U, M>
where
    S: EphemeralStore,
    L: AuditLog,
    U: AccountPort,
    M: MessageSender,
{
    pub async fn request(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<CodeRequested, AuthServiceError> {
        let account = self.mobile_verified_account(user_id).await?;
        let channel = Channel::email(email)?;
        if account.flags.email_verified && account.email.as_deref() == Some(channel.address()) {
            return Err(AuthServiceError::Validation("email already verified".to_owned()));
        }
        if self.lockout.is_locked(channel.address()).await? {
            return Err(AuthServiceError::AccountLocked);
        }

        let issued = self.otc.issue(&channel).await?;
        deliver(&self.messages, &channel, &issued).await;

        Ok(CodeRequested {
            identifier: channel.masked(),
            expires_at: issued.expires_at,
        })
    }

    /// Returns the updated account. Existing tokens keep their old permissions until refreshed.
    pub async fn confirm(
        &self,
        user_id: UserId,
        email: &str,
        code: &str,
    ) -> Result<Account, AuthServiceError> {
        let mut account = self.mobile_verified_account(user_id).await?;
        let channel = Channel::email(email)?;
        let identifier = channel.address();
        if self.lockout.is_locked(identifier).await? {
            return Err(AuthServiceError::AccountLocked);
        }

        if let OtcVerification::Rejected { remaining_attempts } =
            self.otc.verify(&channel, code).await?
        {
            if self
                .lockout
                .record_failed_attempt(identifier, "EMAIL_VERIFICATION")
                .await?
            {
                return Err(AuthServiceError::AccountLocked);
            }
            return Err(AuthServiceError::InvalidCode { remaining_attempts });
        }

        self.lockout.clear_failed_attempts(identifier).await?;
        self.otc.delete(&channel).await?;
        account.email = Some(identifier.to_owned());
        account.flags.email_verified = true;
        account.status = status_after_verification(&account);
        self.accounts.save(&account).await?;
        info!(user_id = %account.id, "email verified");
        Ok(account)
    }

    async fn mobile_verified_account(&self, user_id: UserId) -> Result<Account, AuthServiceError> {
        let account = self
            .accounts
            .find_by_id(user_id)
            .await?
            .ok_or(AuthServiceError::AccountNotFound)?;
        ensure_verified(VerificationRequirement::Mobile, account.flags)?;
        Ok(account)
    }
}

/// Mint a fresh access token reflecting the account's current verification state.
pub struct RefreshSessionUseCase<S, A, U>
where
    S: EphemeralStore,
    A: SessionAudit,
    U: AccountPort,
{
    pub sessions: SessionManager<S, A>,
    pub accounts: U,
}

impl<S, A, U> RefreshSessionUseCase<S, A, U>
where
    S: EphemeralStore,
    A: SessionAudit,
    U: AccountPort,
{
    pub async fn execute(&self, refresh_token: &str) -> Result<SessionTokens, AuthServiceError> {
        let policy = &self.sessions.policy;
        let info = decode_token(refresh_token, &policy.secret, &policy.issuer)?;
        let account = self
            .accounts
            .find_by_id(info.user_id)
            .await?
            .ok_or(AuthServiceError::AccountNotFound)?;
        if account.status == AccountStatus::Suspended {
            self.sessions
                .revoke_all_sessions(account.id, EndReason::SecurityEvent)
                .await?;
            return Err(AuthServiceError::AccountSuspended);
        }
        self.sessions.refresh_session(refresh_token, &account).await
    }
}
