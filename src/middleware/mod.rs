/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth (Bearer 検証), cookies (除去), http (request-id / trace / timeout), response_headers
 */
pub mod auth;
pub mod cookies;
pub mod http;
pub mod response_headers;
