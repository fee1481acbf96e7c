// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory database error: {0}")]
    Db(String),

    #[error("failed to (de)serialize memory tags: {0}")]
    Codec(String),

    #[error("memory not found: {0}")]
    NotFound(String),

    #[error("background task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
