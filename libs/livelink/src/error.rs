// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use thiserror::Error;

use crate::codec::CodecError;

#[derive(Error, Debug)]
pub enum LiveLinkError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Name already in use: {0}")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown subject id {0}")]
    UnknownSubject(u32),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("Provider '{0}' is not connected")]
    NotConnected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Out of resources: {0}")]
    OutOfResources(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<livelink_types::WireError> for LiveLinkError {
    fn from(err: livelink_types::WireError) -> Self {
        LiveLinkError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LiveLinkError>;
