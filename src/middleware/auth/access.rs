//! access token (JWT) 検証 → AuthenticatedIdentity を extensions に入れる
//!
//! - `Authorization: Bearer <jwt>` を Authorizer に渡し、trust domain ごとに検証する
//! - 失敗理由は audit log にのみ残し、クライアントには一律 401 を返す

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::state::AppState;

/// `/api/v1/*` に認証を掛けるための middleware を適用する。
///
/// 例：
/// ```ignore
/// let protected = Router::new().route("/me", get(me));
/// let protected = middleware::auth::access::apply(protected, state.clone());
/// ```
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    // route_layer: match したルートだけ。未定義パスは認証前に 404 へ落とす
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identity = match state
        .authorizer
        .authorize_request(req.headers(), req.uri().query())
        .await
    {
        Ok(identity) => identity,
        Err(err) => {
            tracing::warn!(error = %err, path = %req.uri().path(), "request authentication failed");
            return Err(AppError::Unauthorized);
        }
    };

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}
