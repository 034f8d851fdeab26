// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Bearer JWT authentication (HS256).
//!
//! - `sub` → canonical `user_id`
//! - `role` → [`Role`], defaulting to `Client`
//!
//! All non-health endpoints require authentication. Clock skew tolerance
//! is 60 seconds.

pub mod claims;
pub mod error;
pub mod extractor;
pub mod roles;

pub use claims::{AuthenticatedUser, TokenClaims};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, JwtVerifier};
#[cfg(test)]
pub(crate) use extractor::issue_test_token;
pub use roles::Role;
