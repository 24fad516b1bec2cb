//! End-to-end gateway behavior
//!
//! Every test goes through `UnifiedRouter::from_config_with_clock` with real
//! RSA signatures, so routing, signature checks, claim gates, backwards
//! verification, permission mapping and sessions are exercised together.

mod common;

use std::time::Duration;

use common::{MockIssuerEndpoint, NOW};
use issuergate_auth::{AuthError, BackwardsFailure, ClaimReason, PermissionSet};
use pretty_assertions::assert_eq;
use serde_json::json;

fn canonical(items: &[&str]) -> PermissionSet {
    items.iter().copied().collect()
}

#[tokio::test]
async fn test_tampered_signature_is_rejected_whatever_the_claims() {
    // GIVEN: A gateway trusting issuer A
    let (router, _clock) = common::router(&common::two_issuers());

    for claims in [
        common::claims("A"),
        json!({"iss": "A", "sub": "admin", "aud": "api", "exp": NOW + 1, "permissions": ["all access"]}),
        json!({"iss": "A", "exp": NOW - 100}),
        json!({"iss": "A", "sub": 42, "aud": "api", "exp": "tomorrow"}),
        json!({"iss": "A", "sub": "u1", "aud": {"not": "a list"}, "nbf": [1]}),
    ] {
        // WHEN: A correctly signed token is altered in its signature
        let token = common::tamper_signature(&common::mint(common::ISSUER_A_PRIVATE, &claims));

        // THEN: The signature gate refuses it
        assert!(matches!(
            router.validate(&token).await,
            Err(AuthError::SignatureInvalid)
        ));
    }
}

#[tokio::test]
async fn test_token_signed_by_wrong_key_is_rejected() {
    let (router, _clock) = common::router(&common::two_issuers());

    // Rogue key claiming to be A
    let token = common::mint(common::ROGUE_PRIVATE, &common::claims("A"));

    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::SignatureInvalid)
    ));
}

#[tokio::test]
async fn test_unknown_issuer() {
    let (router, _clock) = common::router(&common::two_issuers());
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("https://evil.example"));

    match router.validate(&token).await {
        Err(AuthError::UnknownIssuer { issuer }) => assert_eq!(issuer, "https://evil.example"),
        other => panic!("expected UnknownIssuer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disabled_issuer_with_valid_token() {
    // GIVEN: A enabled, B disabled
    let (router, _clock) = common::router(&common::two_issuers());

    // WHEN: B presents a perfectly valid token
    let token = common::mint(common::ISSUER_B_PRIVATE, &common::claims("B"));

    // THEN: It is refused before any context is built
    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::IssuerDisabled { issuer }) if issuer == "B"
    ));

    // AND: A still works
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));
    assert_eq!(router.validate(&token).await.unwrap().issuer, "A");
}

#[tokio::test]
async fn test_expired_token() {
    let (router, _clock) = common::router(&common::two_issuers());

    for exp in [NOW - 3600, NOW - 1, NOW] {
        let mut claims = common::claims("A");
        claims["exp"] = json!(exp);
        let token = common::mint(common::ISSUER_A_PRIVATE, &claims);

        match router.validate(&token).await {
            Err(AuthError::ClaimInvalid { reason }) => {
                assert_eq!(reason, ClaimReason::Expired);
                assert_eq!(reason.to_string(), "expired");
            }
            other => panic!("expected expired, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_token_expires_as_clock_moves() {
    let (router, clock) = common::router(&common::two_issuers());
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    assert!(router.validate(&token).await.is_ok());

    clock.set(NOW + 600);
    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::ClaimInvalid {
            reason: ClaimReason::Expired
        })
    ));
}

#[tokio::test]
async fn test_issuer_a_edit_x_scenario() {
    // GIVEN: Issuer A maps "Edit X" to app.x.write
    let (router, _clock) = common::router(&common::two_issuers());

    // WHEN: u1 presents a token with native permissions ["Edit X"]
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));
    let ctx = router.validate(&token).await.unwrap();

    // THEN: The default read is appended
    assert_eq!(ctx.subject, "u1");
    assert_eq!(ctx.display.email.as_deref(), Some("u1@example.com"));
    assert_eq!(ctx.permissions, canonical(&["app.x.write", "app.user.read"]));
}

#[tokio::test]
async fn test_wildcard_and_empty_permission_sets() {
    let (router, _clock) = common::router(&common::two_issuers());

    let mut claims = common::claims("A");
    claims["permissions"] = json!(["Edit X", "all access", "Something Else"]);
    let ctx = router
        .validate(&common::mint(common::ISSUER_A_PRIVATE, &claims))
        .await
        .unwrap();
    assert_eq!(ctx.permissions, canonical(&["app.*"]));

    for native in [json!([]), json!(["Nope", "Also Nope"]), json!(null)] {
        let mut claims = common::claims("A");
        claims["permissions"] = native;
        let ctx = router
            .validate(&common::mint(common::ISSUER_A_PRIVATE, &claims))
            .await
            .unwrap();
        assert_eq!(ctx.permissions, canonical(&["app.user.read"]));
    }
}

#[tokio::test]
async fn test_string_permission_claim_is_one_native_value() {
    // GIVEN: Issuer A sends permissions as a single string
    let (router, _clock) = common::router(&common::two_issuers());

    for (native, expected) in [
        ("all access", canonical(&["app.*"])),
        ("Edit X", canonical(&["app.x.write", "app.user.read"])),
    ] {
        let mut claims = common::claims("A");
        claims["permissions"] = json!(native);

        // WHEN: The token is validated
        let ctx = router
            .validate(&common::mint(common::ISSUER_A_PRIVATE, &claims))
            .await
            .unwrap();

        // THEN: The string maps as a whole, spaces included
        assert_eq!(ctx.permissions, expected);
    }
}

#[tokio::test]
async fn test_idempotent_within_cache_ttl() {
    // GIVEN: Issuer A requires backwards verification
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.confirm(1).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    let (router, clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    // WHEN: The same token is validated twice inside the cache TTL
    let first = router.validate(&token).await.unwrap();
    clock.advance(Duration::from_secs(29));
    let second = router.validate(&token).await.unwrap();

    // THEN: Same permissions, one network call (checked on drop by expect(1))
    assert_eq!(first.permissions, second.permissions);
    assert_eq!(first.subject, second.subject);
}

#[tokio::test]
async fn test_backwards_rejection() {
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.respond(401).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    let (router, _clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::BackwardsVerificationFailed {
            cause: BackwardsFailure::Rejected { status: 401 },
            ..
        })
    ));
}

#[tokio::test]
async fn test_self_issued_skips_endpoint() {
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.confirm(0).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    config.issuers[0].self_issued = true;
    let (router, _clock) = common::router(&config);

    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));
    assert!(router.validate(&token).await.is_ok());
}

#[tokio::test]
async fn test_degraded_mode_with_prior_entry() {
    // GIVEN: A confirmed verification at NOW
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.confirm(1).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    config.backwards_verification.timeout_ms = 100;
    let (router, clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));
    router.validate(&token).await.unwrap();

    // WHEN: The endpoint stops answering in time, past the TTL but inside 5x TTL
    endpoint.reset().await;
    endpoint.stall(Duration::from_secs(2)).await;
    clock.set(NOW + 60);

    // THEN: The stale entry is honored
    assert!(router.validate(&token).await.is_ok());

    // AND: Past the grace window it is not
    clock.set(NOW + 150);
    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::BackwardsVerificationFailed {
            cause: BackwardsFailure::Unreachable,
            ..
        })
    ));
}

#[tokio::test]
async fn test_issuer_server_error_falls_back_to_grace_window() {
    // GIVEN: A confirmed verification at NOW
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.confirm(1).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    let (router, clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));
    router.validate(&token).await.unwrap();

    // WHEN: The issuer starts answering 503 after the TTL
    endpoint.reset().await;
    endpoint.respond(503).await;
    clock.set(NOW + 60);

    // THEN: The outage is not a rejection; the stale entry carries the user
    assert!(router.validate(&token).await.is_ok());

    // AND: A rejection status still fails outright
    endpoint.reset().await;
    endpoint.respond(401).await;
    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::BackwardsVerificationFailed {
            cause: BackwardsFailure::Rejected { status: 401 },
            ..
        })
    ));
}

#[tokio::test]
async fn test_degraded_mode_without_prior_entry() {
    let endpoint = MockIssuerEndpoint::start().await;
    endpoint.stall(Duration::from_secs(2)).await;

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(endpoint.url());
    config.backwards_verification.timeout_ms = 100;
    let (router, _clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::BackwardsVerificationFailed {
            cause: BackwardsFailure::Unreachable,
            ..
        })
    ));
}

#[tokio::test]
async fn test_connection_refused_is_unreachable() {
    // Nothing listens on a port released by a dropped listener
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let url = url::Url::parse(&format!("http://127.0.0.1:{port}/api/me")).unwrap();

    let mut config = common::two_issuers();
    config.issuers[0].verification_endpoint = Some(url);
    let (router, _clock) = common::router(&config);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    assert!(matches!(
        router.validate(&token).await,
        Err(AuthError::BackwardsVerificationFailed {
            cause: BackwardsFailure::Unreachable,
            ..
        })
    ));
}

#[tokio::test]
async fn test_session_sliding_expiration() {
    let (router, clock) = common::router(&common::two_issuers());
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    // GIVEN: Two sessions created at t=0 with TTL 3600
    let (refreshed, ctx) = router.establish_session(&token).await.unwrap();
    let (idle, _) = router.establish_session(&token).await.unwrap();
    assert_ne!(refreshed, idle);

    // WHEN: Only one of them is read at t=3599
    clock.set(NOW + 3599);
    assert_eq!(router.validate_session(&refreshed).await.unwrap(), ctx);

    // THEN: At t=3601 the refreshed one lives and the idle one is gone
    clock.set(NOW + 3601);
    assert!(router.validate_session(&refreshed).await.is_ok());
    assert!(matches!(
        router.validate_session(&idle).await,
        Err(AuthError::SessionNotFound)
    ));

    // AND: The refreshed one lapses 3600s after its last read
    clock.set(NOW + 3601 + 3600);
    assert!(matches!(
        router.validate_session(&refreshed).await,
        Err(AuthError::SessionNotFound)
    ));
}

#[tokio::test]
async fn test_logout_is_permanent() {
    let (router, _clock) = common::router(&common::two_issuers());
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    let (id, _) = router.establish_session(&token).await.unwrap();
    assert!(router.logout(&id).await.unwrap());
    assert!(matches!(
        router.validate_session(&id).await,
        Err(AuthError::SessionNotFound)
    ));

    let (new_id, _) = router.establish_session(&token).await.unwrap();
    assert_ne!(new_id, id);
}

#[tokio::test]
async fn test_concurrent_validations() {
    let (router, _clock) = common::router(&common::two_issuers());
    let router = std::sync::Arc::new(router);
    let token = common::mint(common::ISSUER_A_PRIVATE, &common::claims("A"));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let router = router.clone();
            let token = token.clone();
            tokio::spawn(async move { router.validate(&token).await })
        })
        .collect();

    for task in tasks {
        let ctx = task.await.unwrap().unwrap();
        assert_eq!(ctx.permissions, canonical(&["app.x.write", "app.user.read"]));
    }
}

#[tokio::test]
async fn test_errors_never_echo_the_token() {
    let (router, _clock) = common::router(&common::two_issuers());
    let token = common::tamper_signature(&common::mint(common::ISSUER_A_PRIVATE, &common::claims("A")));
    let signature = token.rsplit('.').next().unwrap();

    let err = router.validate(&token).await.unwrap_err();
    let rendered = format!("{err} {err:?}");
    assert!(!rendered.contains(signature));
    assert!(!rendered.contains(&token));
}
