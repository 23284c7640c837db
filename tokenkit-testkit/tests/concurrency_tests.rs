//! Concurrency tests: racing member updates and parallel token operations.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokenkit_lib::auth::{AuthenticationContext, ON_BEHALF_OF_HEADER};
use tokenkit_lib::member::{Alias, MemberOperation};
use tokenkit_lib::token::{AccessResource, TokenOperationStatus, TokenPayloadBuilder};
use tokenkit_lib::{KeyLevel, TokenkitError};
use tokenkit_testkit::TestWorld;
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_updates_have_exactly_one_winner() {
    let world = TestWorld::new();
    let (alice, _) = world.register("alice").await.expect("register alice");
    let alice = Arc::new(alice);
    let base = alice.refresh().await.expect("refresh").last_hash;

    let mut set = JoinSet::new();
    for i in 0..8 {
        let alice = alice.clone();
        let update = alice.build_update(
            base.clone(),
            vec![MemberOperation::add_alias(&Alias::email(format!("racer{i}@example.com")))
                .expect("alias op")],
        );
        set.spawn(async move { alice.submit_update(update).await });
    }

    let mut winners = 0;
    let mut stale = 0;
    while let Some(joined) = set.join_next().await {
        match joined.expect("task panicked") {
            Ok(_) => winners += 1,
            Err(TokenkitError::StaleBase { .. }) => stale += 1,
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(stale, 7);
    let record = world.platform.member(alice.id()).expect("member");
    assert_eq!(record.aliases.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_losers_can_refetch_and_retry() {
    let world = TestWorld::new();
    let (alice, _) = world.register("alice").await.expect("register alice");
    let alice = Arc::new(alice);

    let mut set = JoinSet::new();
    for i in 0..5 {
        let alice = alice.clone();
        set.spawn(async move {
            let op = MemberOperation::add_alias(&Alias::email(format!("retry{i}@example.com")))
                .expect("alias op");
            loop {
                match alice.update(vec![op.clone()]).await {
                    Err(TokenkitError::StaleBase { .. }) => continue,
                    other => return other,
                }
            }
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.expect("task panicked").expect("update eventually applies");
    }

    let record = world.platform.member(alice.id()).expect("member");
    assert_eq!(record.aliases.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_endorsing_different_tokens_concurrently() {
    let world = TestWorld::new();
    let (alice, _) = world.register("alice").await.expect("register alice");
    let (bob, _) = world.register("bob").await.expect("register bob");
    let alice = Arc::new(alice);

    let mut tokens = Vec::new();
    for i in 1..=6 {
        let amount = dec!(10) * Decimal::from(i);
        let payload = TokenPayloadBuilder::transfer(alice.id().clone(), "EUR", amount)
            .to_member(bob.id().clone())
            .build()
            .expect("payload");
        tokens.push(alice.create_token(payload).await.expect("create"));
    }

    let mut set = JoinSet::new();
    for token in tokens.clone() {
        let alice = alice.clone();
        set.spawn(async move { alice.endorse_token(&token, KeyLevel::Standard).await });
    }
    while let Some(joined) = set.join_next().await {
        let result = joined.expect("task panicked").expect("endorse");
        assert_eq!(result.status, TokenOperationStatus::Success);
    }

    for token in &tokens {
        let stored = world.platform.token(&token.id).expect("stored");
        assert_eq!(stored.payload_signatures.len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_delegations_stay_with_their_own_call() {
    let world = TestWorld::new();
    let (alice, _) = world.register("alice").await.expect("register alice");
    let (bob, _) = world.register("bob").await.expect("register bob");
    let bob = Arc::new(bob);

    let access = alice
        .create_token(
            TokenPayloadBuilder::access(alice.id().clone(), vec![AccessResource::AllAccounts])
                .to_member(bob.id().clone())
                .build()
                .expect("payload"),
        )
        .await
        .expect("create access");
    alice
        .endorse_token(&access, KeyLevel::Standard)
        .await
        .expect("endorse access")
        .require_success()
        .expect("authorized");
    let calls_before = world.platform.calls().len();

    let mut set = JoinSet::new();
    for i in 0..10 {
        let bob = bob.clone();
        let access_id = access.id.clone();
        set.spawn(async move {
            let mut ctx = if i % 2 == 0 {
                AuthenticationContext::with_on_behalf_of(access_id.clone())
            } else {
                AuthenticationContext::new()
            };
            let token = bob.get_token_with(&access_id, &mut ctx).await;
            assert_eq!(ctx.peek(), None);
            token
        });
    }
    while let Some(joined) = set.join_next().await {
        joined.expect("task panicked").expect("bob is the grantee");
    }

    let delegated = world.platform.calls()[calls_before..]
        .iter()
        .filter(|c| c.metadata.contains_key(ON_BEHALF_OF_HEADER))
        .count();
    assert_eq!(delegated, 5);
}
