//! Error types for storage operations

use sea_orm::DbErr;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{GroupId, UserId};

/// Errors that can occur in storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Invalid database path: {0}")]
    InvalidPath(PathBuf),
    #[error("User not found: {0}")]
    UserNotFound(UserId),
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),
    #[error("Contact not found: {owner} -> {contact}")]
    ContactNotFound { owner: UserId, contact: UserId },
    #[error("Contact already exists: {owner} -> {contact}")]
    ContactExists { owner: UserId, contact: UserId },
    #[error("User {user} is already a member of group {group}")]
    AlreadyMember { group: GroupId, user: UserId },
    #[error("Not permitted: {0}")]
    NotPermitted(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
