/*
 * Responsibility
 * - v1 の URL 構造を定義
 * - /me は access middleware (Bearer) の内側
 * - /ws は middleware を通さず、handler 内で subprotocol から認証する
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::{me::me, ws::ws};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new().route("/me", get(me));

    // Provider が 1 つもなければ検証先がないので layer を掛けない
    // (identity が必要な handler は extractor 側で 401 になる)
    let protected = if state.authorizer.has_trust_domains() {
        middleware::auth::access::apply(protected, state)
    } else {
        protected
    };

    Router::new().merge(protected).route("/ws", get(ws))
}
