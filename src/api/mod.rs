//! API Module
//!
//! HTTP handlers and routing for the admin surface.
//!
//! # Endpoints
//! - `GET /health` - Readiness check, 503 while the store is unreachable
//! - `GET /stats` - Cache statistics
//! - `PUT /cache` - Store a value with optional TTL and tags
//! - `GET /cache/:key` - Retrieve a value by key
//! - `DELETE /cache/:key` - Delete a key
//! - `DELETE /cache/tags/:tag` - Invalidate every key under a tag
//! - `POST /cache/invalidate` - Invalidate keys matching a glob

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
