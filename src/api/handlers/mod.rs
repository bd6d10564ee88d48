//! Plain HTTP handlers mounted next to the GraphQL endpoint.

pub mod health;
pub mod root;
