pub mod audit;
pub mod authorizer;
pub mod bypass;
pub mod error;
pub mod factory;
pub mod identity;
pub mod jwks;
pub mod trust_domain;
pub mod validator;

pub use audit::{AuditSink, TracingAuditSink};
pub use authorizer::Authorizer;
pub use bypass::{DevelopmentBypassPolicy, InternalTokenBypass};
pub use error::AuthError;
pub use factory::build_authorizer;
pub use identity::AuthenticatedIdentity;
pub use jwks::{HttpKeySetFetcher, KeySetFetcher, SigningKey, SigningKeyResolver};
pub use trust_domain::{AuthProvider, TrustDomain, TrustDomainRegistry};
pub use validator::{TokenValidator, VerificationOptions};
