//! Cookie stripping.
//!
//! The API is bearer-token only. Incoming `Cookie` headers are dropped before
//! any handler runs and `Set-Cookie` never leaves the service.

use axum::{
    Router,
    body::Body,
    http::{Request, header},
    middleware::{self, Next},
    response::Response,
};

pub fn apply(router: Router) -> Router {
    router.layer(middleware::from_fn(strip_cookies))
}

async fn strip_cookies(mut req: Request<Body>, next: Next) -> Response {
    req.headers_mut().remove(header::COOKIE);

    let mut response = next.run(req).await;
    response.headers_mut().remove(header::SET_COOKIE);
    response
}
