/*
 * Responsibility
 * - GET /api/v1/me
 * - 認証済み identity をそのまま返す (bearer の疎通確認用)
 */
use axum::Json;

use crate::api::v1::extractors::identity::IdentityExtractor;
use crate::services::auth::AuthenticatedIdentity;

pub async fn me(IdentityExtractor(identity): IdentityExtractor) -> Json<AuthenticatedIdentity> {
    Json(identity)
}
