//! API route definitions
//!
//! The primary API is GraphQL at /graphql. The REST surface mirrors the
//! generated entities under /api with OData-style query parameters, and a
//! small admin surface handles configuration reload.

pub mod admin;
pub mod entities;
pub mod health;
