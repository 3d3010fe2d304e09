mod common;

use axum::http::{HeaderMap, HeaderValue, header};
use serde_json::json;

use common::*;
use delivery_api::config::{AppEnv, ServiceType};
use delivery_api::services::auth::{
    AuthError, DevelopmentBypassPolicy, InternalTokenBypass, TrustDomain, TrustDomainRegistry,
};

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

fn subprotocols(value: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_str(value).unwrap(),
    );
    headers
}

#[tokio::test]
async fn valid_rs256_token_yields_identity() {
    let h = harness(default_registry());
    let token = rs256(&claims("user-42"));

    let identity = h
        .authorizer
        .authorize_request(&bearer(&token), None)
        .await
        .unwrap();

    assert_eq!(identity.sub, "user-42");
    assert!(
        h.audit
            .lines()
            .iter()
            .any(|l| l == "User user-42 authenticated")
    );
}

#[tokio::test]
async fn optional_claims_are_carried_over() {
    let h = harness(default_registry());
    let mut c = claims("user-7");
    c["user_id"] = json!("u7");
    c["name"] = json!("Ada");
    c["email"] = json!("ada@example.com");
    c["picture"] = json!("https://example.com/ada.png");

    let identity = h
        .authorizer
        .authorize_request(&bearer(&rs256(&c)), None)
        .await
        .unwrap();

    assert_eq!(identity.user_id.as_deref(), Some("u7"));
    assert_eq!(identity.name.as_deref(), Some("Ada"));
    assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
    assert_eq!(identity.picture.as_deref(), Some("https://example.com/ada.png"));
}

#[tokio::test]
async fn es256_token_yields_identity() {
    let h = harness(default_registry());
    let identity = h
        .authorizer
        .authorize_request(&bearer(&es256(&claims("ec-user"))), None)
        .await
        .unwrap();
    assert_eq!(identity.sub, "ec-user");
}

#[tokio::test]
async fn missing_header_fails_without_fetching_keys() {
    let h = harness(default_registry());

    let err = h
        .authorizer
        .authorize_request(&HeaderMap::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::TokenExtraction(_)));
    assert_eq!(h.fetcher.fetches(), 0);
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let h = harness(default_registry());
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));

    let err = h.authorizer.authorize_request(&headers, None).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenExtraction(_)));
}

#[tokio::test]
async fn unknown_issuer_or_audience_is_rejected_without_fetch() {
    let h = harness(default_registry());

    let mut wrong_iss = claims("user-42");
    wrong_iss["iss"] = json!("https://somewhere-else.test");
    let mut wrong_aud = claims("user-42");
    wrong_aud["aud"] = json!("not-A1");

    for c in [wrong_iss, wrong_aud] {
        let err = h
            .authorizer
            .authorize_request(&bearer(&rs256(&c)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoMatchingIdentity));
    }
    assert_eq!(h.fetcher.fetches(), 0);
}

#[tokio::test]
async fn array_audience_never_routes() {
    let h = harness(default_registry());
    let mut c = claims("user-42");
    c["aud"] = json!([AUDIENCE]);

    let err = h
        .authorizer
        .authorize_request(&bearer(&rs256(&c)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let h = harness(default_registry());
    let token = rs256(&expired_claims("user-42"));

    let err = h
        .authorizer
        .authorize_request(&bearer(&token), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::NoMatchingIdentity));
    assert!(
        h.audit
            .lines()
            .iter()
            .any(|l| l.starts_with(&format!("Token rejected for issuer {ISSUER}")))
    );
}

#[tokio::test]
async fn expired_token_accepted_with_development_disable_exp() {
    let policy = DevelopmentBypassPolicy::resolve(AppEnv::Development, &ServiceType::Devx).unwrap();
    let h = harness(default_registry());
    let authorizer = h.authorizer.with_development_bypass(policy);
    let token = rs256(&expired_claims("user-42"));

    let identity = authorizer
        .authorize_request(&bearer(&token), Some("disable-exp=1"))
        .await
        .unwrap();
    assert_eq!(identity.sub, "user-42");

    // The flag only relaxes expiry; other checks stay on.
    let mut c = expired_claims("user-42");
    c["aud"] = json!("other");
    let err = authorizer
        .authorize_request(&bearer(&rs256(&c)), Some("disable-exp=1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn query_flags_are_ignored_without_development_policy() {
    let policy =
        DevelopmentBypassPolicy::resolve(AppEnv::Production, &ServiceType::parse(Some("prodx")))
            .unwrap();
    assert!(!policy.is_enabled());

    let h = harness(default_registry());
    let authorizer = h.authorizer.with_development_bypass(policy);
    let token = rs256(&expired_claims("user-42"));

    let err = authorizer
        .authorize_request(&bearer(&token), Some("disable-exp=1&disable-verify=1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[test]
fn development_bypass_outside_development_is_fatal() {
    let err = DevelopmentBypassPolicy::resolve(AppEnv::Production, &ServiceType::Devx).unwrap_err();
    assert!(matches!(err, AuthError::InsecureConfiguration));
}

#[tokio::test]
async fn symmetric_and_unsigned_tokens_are_rejected() {
    let h = harness(default_registry());

    for token in [hs256(&claims("user-42")), unsigned(&claims("user-42"))] {
        let err = h
            .authorizer
            .authorize_request(&bearer(&token), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoMatchingIdentity));
    }
}

#[tokio::test]
async fn disable_verify_accepts_bad_signature_only_under_development_policy() {
    let token = rs256_rogue(&claims("user-42"));

    let policy = DevelopmentBypassPolicy::resolve(AppEnv::Development, &ServiceType::Devx).unwrap();
    let relaxed = harness(default_registry())
        .authorizer
        .with_development_bypass(policy);

    let identity = relaxed
        .authorize_request(&bearer(&token), Some("disable-verify"))
        .await
        .unwrap();
    assert_eq!(identity.sub, "user-42");

    // Same policy, no flag.
    let err = relaxed
        .authorize_request(&bearer(&token), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));

    // Flag present, policy disabled.
    let strict = harness(default_registry())
        .authorizer
        .with_development_bypass(DevelopmentBypassPolicy::Disabled);
    let err = strict
        .authorize_request(&bearer(&token), Some("disable-verify"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn unsupported_algorithm_even_with_disable_verify() {
    let policy = DevelopmentBypassPolicy::resolve(AppEnv::Development, &ServiceType::Devx).unwrap();
    let h = harness(default_registry());
    let authorizer = h.authorizer.with_development_bypass(policy);

    let err = authorizer
        .authorize_request(&bearer(&hs256(&claims("user-42"))), Some("disable-verify"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn forged_signature_is_rejected() {
    let h = harness(default_registry());
    let err = h
        .authorizer
        .authorize_request(&bearer(&rs256_rogue(&claims("user-42"))), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn token_without_subject_is_rejected() {
    let h = harness(default_registry());
    let mut c = claims("ignored");
    c.as_object_mut().unwrap().remove("sub");

    let err = h
        .authorizer
        .authorize_request(&bearer(&rs256(&c)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn repeated_requests_hit_the_key_cache() {
    let h = harness(default_registry());
    let headers = bearer(&rs256(&claims("user-42")));

    let first = h.authorizer.authorize_request(&headers, None).await.unwrap();
    let second = h.authorizer.authorize_request(&headers, None).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(h.fetcher.fetches(), 1);
}

#[tokio::test]
async fn later_trust_domain_can_match() {
    let registry = TrustDomainRegistry::new(vec![
        TrustDomain::new(OTHER_ISSUER, OTHER_KEY_SET_URL, OTHER_AUDIENCE),
        TrustDomain::new(ISSUER, KEY_SET_URL, AUDIENCE),
    ]);
    let h = harness(registry);

    let identity = h
        .authorizer
        .authorize_request(&bearer(&rs256(&claims("user-42"))), None)
        .await
        .unwrap();
    assert_eq!(identity.sub, "user-42");
    assert_eq!(h.authorizer.registry().len(), 2);
}

#[tokio::test]
async fn internal_secret_short_circuits_before_key_fetch() {
    let h = harness(default_registry());
    let authorizer = h
        .authorizer
        .with_internal_bypass(InternalTokenBypass::new("s3cret"));

    let mut headers = bearer("s3cret-anything");
    headers.insert("x-mcp-client-id", HeaderValue::from_static("worker-7"));

    let identity = authorizer.authorize_request(&headers, None).await.unwrap();
    assert_eq!(identity.sub, "mcp-client");
    assert_eq!(identity.name.as_deref(), Some("worker-7"));
    assert_eq!(h.fetcher.fetches(), 0);
}

#[tokio::test]
async fn internal_secret_without_bypass_configured_is_rejected() {
    let h = harness(default_registry());
    let err = h
        .authorizer
        .authorize_request(&bearer("s3cret-anything"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn websocket_subprotocol_token_is_accepted() {
    let h = harness(default_registry());
    let token = rs256(&claims("user-42"));
    let headers = subprotocols(&format!("chat, Authorization.Bearer.{token}"));

    let identity = h.authorizer.authorize_websocket(&headers).await.unwrap();
    assert_eq!(identity.sub, "user-42");
}

#[tokio::test]
async fn websocket_without_credential_fails() {
    let h = harness(default_registry());

    let err = h
        .authorizer
        .authorize_websocket(&subprotocols("chat"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExtraction(_)));

    let err = h
        .authorizer
        .authorize_websocket(&subprotocols("Authorization.Bearer.not-a-jwt"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}

#[tokio::test]
async fn websocket_ignores_internal_secret() {
    let h = harness(default_registry());
    let authorizer = h
        .authorizer
        .with_internal_bypass(InternalTokenBypass::new("s3cret"));

    let err = authorizer
        .authorize_websocket(&subprotocols("Authorization.Bearer.s3cret-anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoMatchingIdentity));
}
