//! yatube: posts, groups, comments and follows behind an access policy, with paginated feeds.
//! Hexagonal layout: domain and use cases in the middle, stores and UI at the edges.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod shared;
pub mod usecases;
