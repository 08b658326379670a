//! Data Transfer Objects for HTTP response serialization.

pub mod directory_dto;

pub use directory_dto::*;
