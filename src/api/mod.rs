// =============================================================================
// HTTP/WebSocket API surface
// =============================================================================
//
// `rest` holds the Axum router and control-plane handlers, `auth` the
// bearer-token extractor they share, and `ws` the push-based state feed.

pub mod auth;
pub mod rest;
pub mod ws;
