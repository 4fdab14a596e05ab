//! Core domain layer. No external I/O dependencies.
//!
//! Entities, pagination arithmetic and field rules live here. Dependencies flow inward.

pub mod entities;
pub mod errors;
pub mod pagination;
pub mod validation;

pub use entities::{
    Actor, Comment, Follow, Group, ImageUpdate, NewComment, NewGroup, NewPost, Post, PostFilter,
    StoreSnapshot, User,
};
pub use errors::DomainError;
pub use pagination::{Page, PageWindow, Paginator};
