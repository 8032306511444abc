//! Service-level tests over the in-memory store.
//!
//! Each test drives `BankService` the way the HTTP layer does, with a pinned
//! clock and a notifier that records delivered codes.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use malvader_accounts::{
        Account, AccountKind, AccountNumber, AccountStatus, CheckingTerms, HistoryEvent,
        InvestmentTerms, RequestKey, RiskProfile, SavingsTerms, StatementRange, TransactionKind,
    };
    use malvader_auth::{Actor, AuditAction, EmployeeRank, IdentityInput, NationalId, Role};
    use malvader_core::{Clock, DomainError, ManualClock, Money, PrincipalId};

    use crate::config::SeedManager;
    use crate::export::CsvStatementExporter;
    use crate::notify::{OtpNotifier, RecordingNotifier};
    use crate::services::auth::resolve_actor;
    use crate::services::{AccountHolder, BankService, OpenAccountRequest, RegisterEmployeeRequest};
    use crate::store::{BankStore, InMemoryBankStore, TransactionQuery, UnitOfWork};

    const CUSTOMER_PASSWORD: &str = "customer-pass";

    struct Harness {
        service: BankService<InMemoryBankStore>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        manager: Actor,
        seed: SeedManager,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
    }

    async fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(RecordingNotifier::new());
        let service = BankService::new(
            InMemoryBankStore::new(),
            clock.clone() as Arc<dyn Clock>,
            notifier.clone() as Arc<dyn OtpNotifier>,
            Arc::new(CsvStatementExporter),
        );
        let seed = SeedManager::default();
        assert!(service.seed(&seed.identity(), &seed.password).await.unwrap());
        let manager = actor_for(&service, &seed.national_id).await;
        Harness {
            service,
            clock,
            notifier,
            manager,
            seed,
        }
    }

    async fn actor_for(service: &BankService<InMemoryBankStore>, national_id: &str) -> Actor {
        let mut tx = service.store().begin().await.unwrap();
        let principal = tx
            .principal_by_national_id(&NationalId::parse(national_id).unwrap())
            .await
            .unwrap()
            .unwrap();
        resolve_actor(&mut tx, &principal).await.unwrap()
    }

    fn identity(national_id: &str, email: &str) -> IdentityInput {
        IdentityInput {
            name: format!("Holder {national_id}"),
            national_id: national_id.to_string(),
            email: email.to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 3, 15).unwrap(),
            phone: "61988887777".to_string(),
        }
    }

    fn checking(overdraft: i64) -> AccountKind {
        AccountKind::Checking(CheckingTerms {
            overdraft_limit: Money::from_units(overdraft),
            maintenance_fee: Money::ZERO,
        })
    }

    fn savings() -> AccountKind {
        AccountKind::Savings(SavingsTerms {
            yield_rate: dec!(0.005),
            last_yield_at: None,
        })
    }

    /// Open an account for a brand-new customer and return the customer's actor.
    async fn open_for_new(
        h: &Harness,
        national_id: &str,
        kind: AccountKind,
        opening: Money,
    ) -> (Actor, Account) {
        let email = format!("{national_id}@bank.test");
        let opened = h
            .service
            .open_account(
                &h.manager,
                OpenAccountRequest {
                    holder: AccountHolder::New {
                        identity: identity(national_id, &email),
                        password: Some(CUSTOMER_PASSWORD.to_string()),
                    },
                    kind,
                    initial_deposit: opening,
                },
            )
            .await
            .unwrap();
        let actor = Actor::customer(opened.customer.principal_id, opened.customer.id);
        (actor, opened.account)
    }

    async fn open_for_existing(h: &Harness, national_id: &str, kind: AccountKind) -> Account {
        h.service
            .open_account(
                &h.manager,
                OpenAccountRequest {
                    holder: AccountHolder::Existing {
                        national_id: national_id.to_string(),
                    },
                    kind,
                    initial_deposit: Money::ZERO,
                },
            )
            .await
            .unwrap()
            .account
    }

    async fn balance_of(h: &Harness, account: &Account) -> Money {
        let mut tx = h.service.store().begin().await.unwrap();
        tx.lock_account(account.id).await.unwrap().unwrap().balance
    }

    async fn signed_log_sum(h: &Harness, account: &Account) -> Money {
        let mut tx = h.service.store().begin().await.unwrap();
        tx.transactions_for(account.id, TransactionQuery::default())
            .await
            .unwrap()
            .iter()
            .map(|r| r.signed_amount_for(account.id))
            .sum()
    }

    // ledger

    #[tokio::test]
    async fn balances_always_match_the_signed_transaction_log() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", checking(100), Money::from_units(1_000)).await;
        let (_bob, b) = open_for_new(&h, "22222222222", savings(), Money::ZERO).await;

        h.service.deposit(&alice, &a.number, Money::from_units(200), None).await.unwrap();
        for _ in 0..6 {
            h.service.withdraw(&alice, &a.number, Money::from_units(50), None).await.unwrap();
        }
        h.service
            .transfer(&alice, &a.number, &b.number, Money::from_cents(12_345), None)
            .await
            .unwrap();
        let _ = h.service.withdraw(&alice, &a.number, Money::from_units(5_000), None).await;

        for account in [&a, &b] {
            assert_eq!(balance_of(&h, account).await, signed_log_sum(&h, account).await);
        }
        // 1000 + 200 - 6 * 50 - 5 fee - 123.45
        assert_eq!(balance_of(&h, &a).await, Money::from_cents(77_155));
        assert_eq!(balance_of(&h, &b).await, Money::from_cents(12_345));
    }

    #[tokio::test]
    async fn non_positive_deposits_are_rejected_without_a_record() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        for amount in [Money::ZERO, Money::from_units(-10)] {
            let err = h.service.deposit(&alice, &a.number, amount, None).await.unwrap_err();
            assert_eq!(err, DomainError::InvalidAmount);
        }
        assert_eq!(signed_log_sum(&h, &a).await, Money::ZERO);
        let mut tx = h.service.store().begin().await.unwrap();
        assert!(tx
            .transactions_for(a.id, TransactionQuery::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn checking_overdraft_is_usable_to_the_cent() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", checking(100), Money::from_units(50)).await;

        let err = h
            .service
            .withdraw(&alice, &a.number, Money::from_cents(15_001), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientFunds);

        let receipt = h
            .service
            .withdraw(&alice, &a.number, Money::from_units(150), None)
            .await
            .unwrap();
        assert_eq!(receipt.account.balance, Money::from_units(-100));
    }

    #[tokio::test]
    async fn sixth_withdrawal_in_a_month_carries_the_fee() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(1_000)).await;

        for n in 1..=5 {
            let receipt = h
                .service
                .withdraw(&alice, &a.number, Money::from_units(10), None)
                .await
                .unwrap();
            assert!(!receipt.fee.applies, "withdrawal {n} should be free");
            assert_eq!(receipt.records.len(), 1);
        }

        let receipt = h
            .service
            .withdraw(&alice, &a.number, Money::from_units(10), None)
            .await
            .unwrap();
        assert!(receipt.fee.applies);
        assert_eq!(receipt.account.balance, Money::from_units(1_000 - 60 - 5));
        let kinds: Vec<_> = receipt.records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![TransactionKind::Withdrawal, TransactionKind::Fee]);

        // A new calendar month resets the quota.
        h.clock.set(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let receipt = h
            .service
            .withdraw(&alice, &a.number, Money::from_units(10), None)
            .await
            .unwrap();
        assert!(!receipt.fee.applies);
    }

    #[tokio::test]
    async fn fee_must_also_be_covered() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(100)).await;
        for _ in 0..5 {
            h.service.withdraw(&alice, &a.number, Money::from_units(10), None).await.unwrap();
        }
        // 50 left: 50 + 5 fee is not available.
        let err = h
            .service
            .withdraw(&alice, &a.number, Money::from_units(50), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientFunds);
        assert_eq!(balance_of(&h, &a).await, Money::from_units(50));
    }

    #[tokio::test]
    async fn trailing_deposit_ceiling_is_enforced_and_rolls() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        h.service.deposit(&alice, &a.number, Money::from_units(6_000), None).await.unwrap();
        h.clock.advance(Duration::hours(3));
        h.service.deposit(&alice, &a.number, Money::from_units(4_000), None).await.unwrap();

        let err = h
            .service
            .deposit(&alice, &a.number, Money::from_cents(1), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::DailyLimitExceeded {
                limit: Money::from_units(10_000)
            }
        );
        assert_eq!(balance_of(&h, &a).await, Money::from_units(10_000));

        // 24 h after the first deposit only the second one is inside the window.
        h.clock.advance(Duration::hours(21) + Duration::seconds(1));
        h.service.deposit(&alice, &a.number, Money::from_units(6_000), None).await.unwrap();
    }

    #[tokio::test]
    async fn opening_deposit_skips_the_ceiling_but_fills_the_window() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(12_000)).await;
        assert_eq!(a.balance, Money::from_units(12_000));

        let err = h
            .service
            .deposit(&alice, &a.number, Money::from_units(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DailyLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn investment_minimum_deposit_applies() {
        let h = harness().await;
        let kind = AccountKind::Investment(InvestmentTerms {
            risk_profile: RiskProfile::Medium,
            minimum_deposit: Money::from_units(500),
            base_yield_rate: dec!(0.01),
        });
        let (alice, a) = open_for_new(&h, "11111111111", kind, Money::from_units(100)).await;

        let err = h
            .service
            .deposit(&alice, &a.number, Money::from_units(499), None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::BelowMinimum {
                minimum: Money::from_units(500)
            }
        );
        h.service.deposit(&alice, &a.number, Money::from_units(500), None).await.unwrap();
    }

    #[tokio::test]
    async fn transfer_to_unknown_number_changes_nothing() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(300)).await;
        let unknown = AccountNumber::from_base(999_999).unwrap();

        let err = h
            .service
            .transfer(&alice, &a.number, &unknown, Money::from_units(10), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::DestinationNotFound);
        assert_eq!(balance_of(&h, &a).await, Money::from_units(300));
    }

    #[tokio::test]
    async fn transfers_ignore_overdraft_and_reject_self() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", checking(1_000), Money::from_units(100)).await;
        let (_bob, b) = open_for_new(&h, "22222222222", savings(), Money::ZERO).await;

        let err = h
            .service
            .transfer(&alice, &a.number, &b.number, Money::from_cents(10_001), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InsufficientFunds);

        let err = h
            .service
            .transfer(&alice, &a.number, &a.number, Money::from_units(1), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::SelfTransfer);

        let receipt = h
            .service
            .transfer(&alice, &a.number, &b.number, Money::from_units(100), None)
            .await
            .unwrap();
        assert_eq!(receipt.account.balance, Money::ZERO);
        assert_eq!(receipt.records[0].description, format!("Transfer to {}", b.number));
        assert_eq!(balance_of(&h, &b).await, Money::from_units(100));
    }

    #[tokio::test]
    async fn customers_only_touch_their_own_accounts() {
        let h = harness().await;
        let (_alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(100)).await;
        let (bob, _b) = open_for_new(&h, "22222222222", savings(), Money::ZERO).await;

        let err = h
            .service
            .withdraw(&bob, &a.number, Money::from_units(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));

        let err = h
            .service
            .deposit(&h.manager, &a.number, Money::from_units(10), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn repeated_request_keys_apply_once() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let key = RequestKey::new("dep-0001").unwrap();

        h.service
            .deposit(&alice, &a.number, Money::from_units(40), Some(&key))
            .await
            .unwrap();
        let err = h
            .service
            .deposit(&alice, &a.number, Money::from_units(40), Some(&key))
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::DuplicateRequest);
        assert_eq!(balance_of(&h, &a).await, Money::from_units(40));

        // A rejected operation does not burn its key.
        let retry = RequestKey::new("wd-0001").unwrap();
        assert!(h
            .service
            .withdraw(&alice, &a.number, Money::from_units(100), Some(&retry))
            .await
            .is_err());
        h.service
            .withdraw(&alice, &a.number, Money::from_units(10), Some(&retry))
            .await
            .unwrap();
    }

    // lifecycle

    #[tokio::test]
    async fn opening_writes_history_audit_and_opening_deposit() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(250)).await;

        assert_eq!(a.status, AccountStatus::Active);
        assert!(a.number.is_luhn_valid());
        assert_eq!(a.balance, Money::from_units(250));

        let mut tx = h.service.store().begin().await.unwrap();
        let history = tx.history_for(a.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event, HistoryEvent::Opening);
        assert_eq!(history[0].employee_id, h.manager.employee_id);

        let records = tx.transactions_for(a.id, TransactionQuery::default()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Opening deposit");

        let audit = tx.audit_for(h.manager.principal_id).await.unwrap();
        assert!(audit.iter().any(|e| e.action == AuditAction::AccountOpened));

        let customer = tx.customer(alice.customer_id.unwrap()).await.unwrap().unwrap();
        assert_eq!(customer.credit_score, dec!(500.00));
    }

    #[tokio::test]
    async fn opening_validates_identity_and_uniqueness() {
        let h = harness().await;
        open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        let request = |identity: IdentityInput| OpenAccountRequest {
            holder: AccountHolder::New {
                identity,
                password: None,
            },
            kind: savings(),
            initial_deposit: Money::ZERO,
        };

        let duplicate = identity("111.111.111-11", "other@bank.test");
        let err = h.service.open_account(&h.manager, request(duplicate)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut too_young = identity("33333333333", "young@bank.test");
        too_young.birth_date = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap();
        let err = h.service.open_account(&h.manager, request(too_young)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = h
            .service
            .open_account(
                &h.manager,
                OpenAccountRequest {
                    holder: AccountHolder::Existing {
                        national_id: "99999999999".to_string(),
                    },
                    kind: savings(),
                    initial_deposit: Money::ZERO,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound("customer"));
    }

    #[tokio::test]
    async fn generated_account_numbers_are_unique_and_luhn_valid() {
        let h = harness().await;
        let (_alice, first) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let mut numbers = std::collections::HashSet::from([first.number.to_string()]);
        for _ in 0..40 {
            let account = open_for_existing(&h, "11111111111", savings()).await;
            assert!(account.number.is_luhn_valid());
            assert!(numbers.insert(account.number.to_string()));
        }
    }

    #[tokio::test]
    async fn closure_requires_zero_balance_password_and_code() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(20)).await;

        let err = h
            .service
            .request_closure(&h.manager, &a.number, "customer request")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::NonZeroBalance {
                balance: Money::from_units(20)
            }
        );

        h.service.withdraw(&alice, &a.number, Money::from_units(20), None).await.unwrap();
        let challenge = h
            .service
            .request_closure(&h.manager, &a.number, "customer request")
            .await
            .unwrap();
        assert_eq!(challenge.expires_at, h.clock.now() + Duration::minutes(5));
        let code = h.notifier.last_code_for(&h.seed.email).unwrap();

        let err = h
            .service
            .confirm_closure(&h.manager, challenge.token, "wrong-password", &code)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials { .. }));

        let wrong_code = if code == "123456" { "654321" } else { "123456" };
        let err = h
            .service
            .confirm_closure(&h.manager, challenge.token, &h.seed.password, wrong_code)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InvalidOtp);

        let closed = h
            .service
            .confirm_closure(&h.manager, challenge.token, &h.seed.password, &code)
            .await
            .unwrap();
        assert_eq!(closed.status, AccountStatus::Closed);

        let mut tx = h.service.store().begin().await.unwrap();
        let history = tx.history_for(a.id).await.unwrap();
        assert_eq!(history.last().unwrap().event, HistoryEvent::Closure);
        assert_eq!(history.last().unwrap().reason, "customer request");
        assert!(tx.pending(challenge.token).await.unwrap().is_none());
        drop(tx);

        let err = h
            .service
            .deposit(&alice, &a.number, Money::from_units(1), None)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::AccountNotActive);
    }

    #[tokio::test]
    async fn closure_code_expires_after_five_minutes() {
        let h = harness().await;
        let (_alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let challenge = h
            .service
            .request_closure(&h.manager, &a.number, "duplicate account")
            .await
            .unwrap();
        let code = h.notifier.last_code_for(&h.seed.email).unwrap();

        h.clock.advance(Duration::minutes(5));
        let err = h
            .service
            .confirm_closure(&h.manager, challenge.token, &h.seed.password, &code)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::InvalidOtp);
        assert_eq!(balance_of(&h, &a).await, Money::ZERO);

        let mut tx = h.service.store().begin().await.unwrap();
        assert!(tx.pending(challenge.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn abandoned_closure_requests_are_swept_on_the_next_request() {
        let h = harness().await;
        let (_alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let (_bob, b) = open_for_new(&h, "22222222222", savings(), Money::ZERO).await;
        let abandoned = h
            .service
            .request_closure(&h.manager, &a.number, "never confirmed")
            .await
            .unwrap();

        h.clock.advance(Duration::minutes(6));
        let fresh = h
            .service
            .request_closure(&h.manager, &b.number, "customer request")
            .await
            .unwrap();

        let mut tx = h.service.store().begin().await.unwrap();
        assert!(tx.pending(abandoned.token).await.unwrap().is_none());
        assert!(tx.pending(fresh.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn interns_cannot_close_and_only_managers_register_staff() {
        let h = harness().await;
        let registered = h
            .service
            .register_employee(
                &h.manager,
                RegisterEmployeeRequest {
                    identity: identity("44444444444", "intern@bank.test"),
                    rank: EmployeeRank::Intern,
                    password: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(registered.employee.code.as_str(), "FUNC002");
        assert_eq!(registered.employee.supervisor_id, h.manager.employee_id);
        assert_eq!(registered.issued_password.as_ref().map(String::len), Some(12));

        let intern = actor_for(&h.service, "44444444444").await;
        let (_alice, a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let err = h
            .service
            .request_closure(&intern, &a.number, "no reason")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));

        let err = h
            .service
            .register_employee(
                &intern,
                RegisterEmployeeRequest {
                    identity: identity("55555555555", "other@bank.test"),
                    rank: EmployeeRank::Teller,
                    password: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));

        let team = h.service.subordinates(&h.manager).await.unwrap();
        assert_eq!(team.len(), 1);
        assert_eq!(team[0].email, "intern@bank.test");
    }

    // authentication

    async fn login_code(
        h: &Harness,
        role: Role,
        national_id: &str,
        password: &str,
        email: &str,
    ) -> (PrincipalId, String) {
        let challenge = h.service.login(role, national_id, password).await.unwrap();
        (challenge.principal_id, h.notifier.last_code_for(email).unwrap())
    }

    #[tokio::test]
    async fn three_failures_lock_and_a_success_resets_the_window() {
        let h = harness().await;
        open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        for attempt in 1..=3 {
            let err = h
                .service
                .login(Role::Customer, "11111111111", "bad-password")
                .await
                .unwrap_err();
            assert_eq!(
                err,
                DomainError::InvalidCredentials {
                    final_attempt: attempt == 3
                }
            );
        }

        let err = h
            .service
            .login(Role::Customer, "11111111111", CUSTOMER_PASSWORD)
            .await
            .unwrap_err();
        assert_eq!(err, DomainError::AccountLocked { remaining_minutes: 11 });

        h.clock.advance(Duration::minutes(10));
        h.service
            .login(Role::Customer, "11111111111", CUSTOMER_PASSWORD)
            .await
            .unwrap();

        // Failures before the success no longer count.
        for _ in 0..2 {
            let _ = h.service.login(Role::Customer, "11111111111", "bad-password").await;
        }
        h.service
            .login(Role::Customer, "11111111111", CUSTOMER_PASSWORD)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_identity_and_wrong_role_look_like_bad_passwords() {
        let h = harness().await;
        open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        let unknown = h
            .service
            .login(Role::Customer, "98765432100", CUSTOMER_PASSWORD)
            .await
            .unwrap_err();
        let wrong_role = h
            .service
            .login(Role::Employee, "11111111111", CUSTOMER_PASSWORD)
            .await
            .unwrap_err();
        let expected = DomainError::InvalidCredentials {
            final_attempt: false,
        };
        assert_eq!(unknown, expected);
        assert_eq!(wrong_role, expected);
        assert_eq!(unknown.to_string(), wrong_role.to_string());
    }

    #[tokio::test]
    async fn login_code_opens_a_session_once() {
        let h = harness().await;
        let (alice, _a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let (principal_id, code) =
            login_code(&h, Role::Customer, "11111111111", CUSTOMER_PASSWORD, "11111111111@bank.test").await;

        let session = h.service.verify_otp(principal_id, &code).await.unwrap();
        assert_eq!(session.actor, alice);
        // Holders created at a branch start with a provisional password.
        assert!(session.claims.password_change_required);
        assert_eq!(session.claims.exp - session.claims.iat, 60 * 60);

        let err = h.service.verify_otp(principal_id, &code).await.unwrap_err();
        assert_eq!(err, DomainError::InvalidOtp);
    }

    #[tokio::test]
    async fn login_code_expires_and_wrong_codes_are_capped() {
        let h = harness().await;
        open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let email = "11111111111@bank.test";

        let (principal_id, code) = login_code(&h, Role::Customer, "11111111111", CUSTOMER_PASSWORD, email).await;
        h.clock.advance(Duration::minutes(10));
        assert_eq!(
            h.service.verify_otp(principal_id, &code).await.unwrap_err(),
            DomainError::InvalidOtp
        );

        let (principal_id, code) = login_code(&h, Role::Customer, "11111111111", CUSTOMER_PASSWORD, email).await;
        let wrong = if code == "111111" { "222222" } else { "111111" };
        for _ in 0..5 {
            assert_eq!(
                h.service.verify_otp(principal_id, wrong).await.unwrap_err(),
                DomainError::InvalidOtp
            );
        }
        // The code was discarded after the fifth miss.
        assert_eq!(
            h.service.verify_otp(principal_id, &code).await.unwrap_err(),
            DomainError::InvalidOtp
        );

        let mut tx = h.service.store().begin().await.unwrap();
        let failures = tx
            .audit_for(principal_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.action == AuditAction::OtpFailure)
            .count();
        assert!(failures >= 5);
    }

    #[tokio::test]
    async fn failed_delivery_keeps_the_success_audit_but_no_code() {
        let h = harness().await;
        open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        h.notifier.set_failing(true);

        let err = h
            .service
            .login(Role::Customer, "11111111111", CUSTOMER_PASSWORD)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotificationFailed(_)));

        let mut tx = h.service.store().begin().await.unwrap();
        let principal = tx
            .principal_by_national_id(&NationalId::parse("11111111111").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(principal.otp.is_none());
        let audit = tx.audit_for(principal.id).await.unwrap();
        assert_eq!(audit.last().unwrap().action, AuditAction::LoginSuccess);
    }

    #[tokio::test]
    async fn password_change_clears_the_provisional_flag() {
        let h = harness().await;
        let (alice, _a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;

        let err = h
            .service
            .change_password(&alice, CUSTOMER_PASSWORD, "short")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let err = h
            .service
            .change_password(&alice, "not-my-password", "a-much-better-one")
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials { .. }));

        let session = h
            .service
            .change_password(&alice, CUSTOMER_PASSWORD, "a-much-better-one")
            .await
            .unwrap();
        assert!(!session.claims.password_change_required);

        let (principal_id, code) =
            login_code(&h, Role::Customer, "11111111111", "a-much-better-one", "11111111111@bank.test").await;
        let session = h.service.verify_otp(principal_id, &code).await.unwrap();
        assert!(!session.claims.password_change_required);
    }

    #[tokio::test]
    async fn signup_creates_a_customer_with_the_default_score() {
        let h = harness().await;
        let input = identity("66666666666", "self@bank.test");
        let customer = h.service.signup(&input, "self-service-pass").await.unwrap();
        assert_eq!(customer.credit_score, dec!(500.00));

        let err = h.service.signup(&input, "self-service-pass").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let (principal_id, code) =
            login_code(&h, Role::Customer, "66666666666", "self-service-pass", "self@bank.test").await;
        let session = h.service.verify_otp(principal_id, &code).await.unwrap();
        assert!(!session.claims.password_change_required);
    }

    // read side

    #[tokio::test]
    async fn statement_is_newest_first_and_respects_dates() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(100)).await;
        h.clock.advance(Duration::days(1));
        h.service.deposit(&alice, &a.number, Money::from_units(30), None).await.unwrap();
        h.clock.advance(Duration::days(1));
        h.service.withdraw(&alice, &a.number, Money::from_units(20), None).await.unwrap();

        let all = h
            .service
            .statement(&alice, &a.number, StatementRange::default())
            .await
            .unwrap();
        let amounts: Vec<_> = all.iter().map(|l| l.signed_amount).collect();
        assert_eq!(
            amounts,
            vec![Money::from_units(-20), Money::from_units(30), Money::from_units(100)]
        );

        let day = (start() + Duration::days(1)).date_naive();
        let range = StatementRange::new(Some(day), Some(day)).unwrap();
        let lines = h.service.statement(&alice, &a.number, range).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].kind, TransactionKind::Deposit);

        let document = h
            .service
            .export_statement(&alice, &a.number, StatementRange::default())
            .await
            .unwrap();
        assert!(document.file_name.ends_with(".csv"));
        assert_eq!(String::from_utf8(document.bytes).unwrap().lines().count(), 4);
    }

    #[tokio::test]
    async fn statement_end_date_includes_fractional_seconds_before_midnight() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(100)).await;
        let day = start().date_naive();
        h.clock
            .set(day.and_hms_milli_opt(23, 59, 59, 500).unwrap().and_utc());
        h.service.deposit(&alice, &a.number, Money::from_units(7), None).await.unwrap();
        h.clock.advance(Duration::milliseconds(500));
        h.service.deposit(&alice, &a.number, Money::from_units(9), None).await.unwrap();

        let range = StatementRange::new(Some(day), Some(day)).unwrap();
        let lines = h.service.statement(&alice, &a.number, range).await.unwrap();
        let amounts: Vec<_> = lines.iter().map(|l| l.signed_amount).collect();
        assert_eq!(amounts, vec![Money::from_units(7), Money::from_units(100)]);
    }

    #[tokio::test]
    async fn dashboard_shows_first_account_and_last_five_lines() {
        let h = harness().await;
        let (alice, a) = open_for_new(&h, "11111111111", savings(), Money::from_units(100)).await;
        open_for_existing(&h, "11111111111", checking(0)).await;
        for _ in 0..6 {
            h.clock.advance(Duration::minutes(1));
            h.service.deposit(&alice, &a.number, Money::from_units(1), None).await.unwrap();
        }

        let dashboard = h.service.dashboard(&alice).await.unwrap();
        assert_eq!(dashboard.account.unwrap().id, a.id);
        assert_eq!(dashboard.recent.len(), 5);
        assert_eq!(dashboard.customer_name, "Holder 11111111111");
    }

    #[tokio::test]
    async fn credit_limit_projects_from_the_score() {
        let h = harness().await;
        let (alice, _a) = open_for_new(&h, "11111111111", savings(), Money::ZERO).await;
        let projection = h.service.credit_limit(&alice).await.unwrap();
        assert_eq!(projection.score, Decimal::new(50_000, 2));
        assert_eq!(projection.current_limit, Money::from_units(750));
        assert_eq!(projection.projected_limit, Money::from_cents(93_750));

        let err = h.service.credit_limit(&h.manager).await.unwrap_err();
        assert!(matches!(err, DomainError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn seeding_runs_once() {
        let h = harness().await;
        assert!(!h.service.seed(&h.seed.identity(), &h.seed.password).await.unwrap());
        assert_eq!(h.manager.rank, Some(EmployeeRank::Manager));
    }
}
