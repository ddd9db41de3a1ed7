//! # Middleware Module
//!
//! Middleware runs before the route handler and can short-circuit the
//! request with an error response.
//!
//! ## Our Middleware
//! - `auth`: Rejects requests from sessions that have not signed in

pub mod auth;
