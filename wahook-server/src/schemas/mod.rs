//! Request/response DTOs of the HTTP surface, with their OpenAPI schemas.

pub mod admin;
