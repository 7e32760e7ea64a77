use ridepool_auth::domain::keys;
use ridepool_auth::domain::types::{RateLimitPolicy, SecurityEventType};
use ridepool_auth::error::AuthServiceError;
use ridepool_auth::infra::session_audit::StoreSessionAudit;
use ridepool_auth::usecase::account::{
    CodePurpose, EmailVerificationUseCase, RefreshSessionUseCase, RequestCodeInput,
    RequestCodeUseCase, VerifyCodeInput, VerifyCodeUseCase,
};
use ridepool_auth::usecase::risk::RiskMonitor;
use ridepool_domain::account::{AccountStatus, Permission, VerificationFlags};
use ridepool_domain::device::DeviceInfo;

use crate::helpers::{
    MockAccountPort, MockAuditLog, MockMessageSender, MockStore, TEST_PHONE, account,
    lockout_guard, mobile_verified_account, otc_manager, phone, rate_limiter, session_manager,
};

const EMAIL: &str = "rider@corp.example";

type Requester = RequestCodeUseCase<MockStore, MockAuditLog, MockAccountPort, MockMessageSender>;
type Verifier =
    VerifyCodeUseCase<MockStore, MockAuditLog, MockAccountPort, StoreSessionAudit<MockStore>>;

struct Harness {
    store: MockStore,
    audit: MockAuditLog,
    accounts: MockAccountPort,
    messages: MockMessageSender,
}

impl Harness {
    fn new(accounts: MockAccountPort) -> Self {
        Self {
            store: MockStore::new(),
            audit: MockAuditLog::default(),
            accounts,
            messages: MockMessageSender::default(),
        }
    }

    fn requester(&self) -> Requester {
        RequestCodeUseCase {
            limiter: rate_limiter(&self.store),
            lockout: lockout_guard(&self.store, &self.audit),
            otc: otc_manager(&self.store, &self.audit),
            accounts: self.accounts.clone(),
            messages: self.messages.clone(),
            default_country_code: "+1".to_owned(),
        }
    }

    fn verifier(&self) -> Verifier {
        VerifyCodeUseCase {
            lockout: lockout_guard(&self.store, &self.audit),
            otc: otc_manager(&self.store, &self.audit),
            sessions: session_manager(&self.store),
            accounts: self.accounts.clone(),
            audit: self.audit.clone(),
            risk: RiskMonitor::disabled(),
            default_country_code: "+1".to_owned(),
        }
    }

    fn email(&self) -> EmailVerificationUseCase<MockStore, MockAuditLog, MockAccountPort, MockMessageSender> {
        EmailVerificationUseCase {
            lockout: lockout_guard(&self.store, &self.audit),
            otc: otc_manager(&self.store, &self.audit),
            accounts: self.accounts.clone(),
            messages: self.messages.clone(),
        }
    }

    fn refresher(&self) -> RefreshSessionUseCase<MockStore, StoreSessionAudit<MockStore>, MockAccountPort> {
        RefreshSessionUseCase {
            sessions: session_manager(&self.store),
            accounts: self.accounts.clone(),
        }
    }

    async fn request(&self, purpose: CodePurpose) -> Result<String, AuthServiceError> {
        self.requester()
            .execute(RequestCodeInput {
                phone: "(555) 123-4567".to_owned(),
                purpose,
            })
            .await?;
        Ok(self.messages.last_code(TEST_PHONE).unwrap())
    }

    async fn verify(&self, code: &str) -> Result<ridepool_auth::domain::types::SessionTokens, AuthServiceError> {
        self.verifier()
            .execute(VerifyCodeInput {
                phone: TEST_PHONE.to_owned(),
                code: code.to_owned(),
                device: DeviceInfo {
                    device_id: Some("dev-1".to_owned()),
                    user_agent: Some("RidepoolApp/4.2".to_owned()),
                    ..DeviceInfo::default()
                },
                source_address: Some("203.0.113.9".to_owned()),
            })
            .await
    }
}

fn wrong(code: &str) -> String {
    if code == "000000" { "111111" } else { "000000" }.to_owned()
}

#[tokio::test]
async fn should_sign_in_after_two_wrong_codes() {
    let existing = mobile_verified_account();
    let h = Harness::new(MockAccountPort::with(vec![existing.clone()]));
    let code = h.request(CodePurpose::Login).await.unwrap();

    let first = h.verify(&wrong(&code)).await;
    assert!(
        matches!(first, Err(AuthServiceError::InvalidCode { remaining_attempts: 2 })),
        "got {first:?}"
    );
    let second = h.verify(&wrong(&code)).await;
    assert!(
        matches!(second, Err(AuthServiceError::InvalidCode { remaining_attempts: 1 })),
        "got {second:?}"
    );
    assert_eq!(
        lockout_guard(&h.store, &h.audit).failed_attempts(TEST_PHONE).await.unwrap(),
        2
    );

    let tokens = h.verify(&code).await.unwrap();

    assert_eq!(tokens.user_id, existing.id);
    assert!(tokens.permissions.contains(&Permission::MobileVerified));
    assert_eq!(
        lockout_guard(&h.store, &h.audit).failed_attempts(TEST_PHONE).await.unwrap(),
        0
    );
    assert!(!otc_manager(&h.store, &h.audit).has_valid_code(&phone()).await.unwrap());
    assert_eq!(h.audit.count(SecurityEventType::LoginFailure), 2);
    assert_eq!(h.audit.count(SecurityEventType::LoginSuccess), 1);
}

#[tokio::test]
async fn should_create_pending_account_on_registration() {
    let h = Harness::new(MockAccountPort::default());

    let code = h.request(CodePurpose::Register).await.unwrap();
    let tokens = h.verify(&code).await.unwrap();

    let created = h.accounts.get(tokens.user_id).unwrap();
    assert_eq!(created.phone_number, TEST_PHONE);
    assert!(created.flags.mobile_verified);
    assert_eq!(created.status, AccountStatus::PendingEmail);
}

#[tokio::test]
async fn should_refuse_registration_of_verified_number() {
    let h = Harness::new(MockAccountPort::with(vec![mobile_verified_account()]));

    let result = h.request(CodePurpose::Register).await;

    assert!(
        matches!(result, Err(AuthServiceError::AccountAlreadyExists)),
        "got {result:?}"
    );
    assert!(h.messages.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_refuse_login_for_unknown_number() {
    let h = Harness::new(MockAccountPort::default());

    let result = h.request(CodePurpose::Login).await;

    assert!(matches!(result, Err(AuthServiceError::AccountNotFound)), "got {result:?}");
}

#[tokio::test]
async fn should_refuse_login_for_suspended_account() {
    let suspended = account(
        VerificationFlags {
            mobile_verified: true,
            email_verified: true,
        },
        AccountStatus::Suspended,
    );
    let h = Harness::new(MockAccountPort::with(vec![suspended]));

    let result = h.request(CodePurpose::Login).await;

    assert!(matches!(result, Err(AuthServiceError::AccountSuspended)), "got {result:?}");
}

#[tokio::test]
async fn should_refuse_code_request_while_locked() {
    let h = Harness::new(MockAccountPort::with(vec![mobile_verified_account()]));
    let guard = lockout_guard(&h.store, &h.audit);
    for _ in 0..5 {
        guard.record_failed_attempt(TEST_PHONE, "OTC_VERIFICATION").await.unwrap();
    }

    let result = h.request(CodePurpose::Login).await;

    assert!(matches!(result, Err(AuthServiceError::AccountLocked)), "got {result:?}");
}

#[tokio::test]
async fn should_track_excess_login_requests_as_suspicious() {
    let h = Harness::new(MockAccountPort::with(vec![mobile_verified_account()]));
    let mut requester = h.requester();
    requester.limiter.policy = RateLimitPolicy {
        login_attempts_per_hour: 2,
        ..RateLimitPolicy::default()
    };
    let input = || RequestCodeInput {
        phone: TEST_PHONE.to_owned(),
        purpose: CodePurpose::Login,
    };

    requester.execute(input()).await.unwrap();
    requester.execute(input()).await.unwrap();
    let third = requester.execute(input()).await;

    assert!(matches!(third, Err(AuthServiceError::RateLimitExceeded)), "got {third:?}");
    assert_eq!(
        h.store
            .raw(&keys::suspicious(TEST_PHONE, "EXCESSIVE_LOGIN_ATTEMPTS"))
            .as_deref(),
        Some("1")
    );
    assert_eq!(h.audit.count(SecurityEventType::SuspiciousActivity), 1);
}

#[tokio::test]
async fn should_keep_code_valid_when_delivery_fails() {
    let mut h = Harness::new(MockAccountPort::with(vec![mobile_verified_account()]));
    h.messages = MockMessageSender::failing();

    let requested = h
        .requester()
        .execute(RequestCodeInput {
            phone: TEST_PHONE.to_owned(),
            purpose: CodePurpose::Login,
        })
        .await
        .unwrap();

    assert_eq!(requested.identifier, "****4567");
    assert!(otc_manager(&h.store, &h.audit).has_valid_code(&phone()).await.unwrap());
}

#[tokio::test]
async fn should_lock_after_failures_spread_over_two_codes() {
    let h = Harness::new(MockAccountPort::with(vec![mobile_verified_account()]));

    let first = h.request(CodePurpose::Login).await.unwrap();
    for _ in 0..3 {
        h.verify(&wrong(&first)).await.unwrap_err();
    }
    let second = h.request(CodePurpose::Login).await.unwrap();
    h.verify(&wrong(&second)).await.unwrap_err();
    let fifth = h.verify(&wrong(&second)).await;

    assert!(matches!(fifth, Err(AuthServiceError::AccountLocked)), "got {fifth:?}");
    // The right code no longer helps.
    let after = h.verify(&second).await;
    assert!(matches!(after, Err(AuthServiceError::AccountLocked)), "got {after:?}");
    assert_eq!(h.audit.count(SecurityEventType::AccountLocked), 1);
}

#[tokio::test]
async fn should_activate_account_once_email_is_confirmed_and_refresh_picks_it_up() {
    let rider = mobile_verified_account();
    let h = Harness::new(MockAccountPort::with(vec![rider.clone()]));
    let code = h.request(CodePurpose::Login).await.unwrap();
    let tokens = h.verify(&code).await.unwrap();
    assert!(!tokens.permissions.contains(&Permission::FullyVerified));

    let requested = h.email().request(rider.id, "Rider@Corp.example").await.unwrap();
    assert_eq!(requested.identifier, "****mple");
    let email_code = h.messages.last_code(EMAIL).unwrap();
    let updated = h.email().confirm(rider.id, EMAIL, &email_code).await.unwrap();

    assert_eq!(updated.email.as_deref(), Some(EMAIL));
    assert_eq!(updated.status, AccountStatus::Active);
    assert_eq!(h.accounts.get(rider.id).unwrap().status, AccountStatus::Active);

    let refreshed = h.refresher().execute(&tokens.refresh_token).await.unwrap();
    assert_eq!(
        refreshed.permissions,
        [
            Permission::MobileVerified,
            Permission::EmailVerified,
            Permission::FullyVerified,
            Permission::AccessRideFeatures,
            Permission::AccountActive,
        ]
    );
    assert_eq!(refreshed.refresh_token, tokens.refresh_token);
}

#[tokio::test]
async fn should_refuse_email_verification_before_mobile() {
    let unverified = account(VerificationFlags::default(), AccountStatus::PendingEmail);
    let h = Harness::new(MockAccountPort::with(vec![unverified.clone()]));

    let result = h.email().request(unverified.id, EMAIL).await;

    assert!(
        matches!(result, Err(AuthServiceError::VerificationRequired(_))),
        "got {result:?}"
    );
}

#[tokio::test]
async fn should_revoke_everything_when_refreshing_a_suspended_account() {
    let rider = mobile_verified_account();
    let h = Harness::new(MockAccountPort::with(vec![rider.clone()]));
    let code = h.request(CodePurpose::Login).await.unwrap();
    let tokens = h.verify(&code).await.unwrap();

    let mut suspended = rider.clone();
    suspended.status = AccountStatus::Suspended;
    *h.accounts.accounts.lock().unwrap() = vec![suspended];

    let result = h.refresher().execute(&tokens.refresh_token).await;

    assert!(matches!(result, Err(AuthServiceError::AccountSuspended)), "got {result:?}");
    assert!(!session_manager(&h.store)
        .is_session_active(tokens.session_id)
        .await
        .unwrap());
}
