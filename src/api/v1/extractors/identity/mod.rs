/*!
 * Authenticated identity extractor
 *
 * Responsibility:
 * - access middleware が検証済みの AuthenticatedIdentity を handler に渡す
 * - 型定義は services::auth::identity 側にあり、ここは axum 依存のみ
 */

mod core;

pub use core::IdentityExtractor;
