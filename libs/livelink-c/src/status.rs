// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Status codes returned by every `ll_*` entry point.

use std::ffi::CStr;

use livelink::{CodecError, LiveLinkError};

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlStatus {
    Ok = 0,
    InvalidHandle = 1,
    DuplicateName = 2,
    NotFound = 3,
    UnknownSubject = 4,
    FormatError = 5,
    InvalidValue = 6,
    InvalidRotation = 7,
    NotConnected = 8,
    TransportError = 9,
    OutOfResources = 10,
    InvalidArgument = 11,
    /// Not an error: nothing to poll.
    NoEvent = 12,
    Internal = 13,
}

pub const LL_OK: i32 = LlStatus::Ok as i32;
pub const LL_INVALID_HANDLE: i32 = LlStatus::InvalidHandle as i32;
pub const LL_DUPLICATE_NAME: i32 = LlStatus::DuplicateName as i32;
pub const LL_NOT_FOUND: i32 = LlStatus::NotFound as i32;
pub const LL_UNKNOWN_SUBJECT: i32 = LlStatus::UnknownSubject as i32;
pub const LL_FORMAT_ERROR: i32 = LlStatus::FormatError as i32;
pub const LL_INVALID_VALUE: i32 = LlStatus::InvalidValue as i32;
pub const LL_INVALID_ROTATION: i32 = LlStatus::InvalidRotation as i32;
pub const LL_NOT_CONNECTED: i32 = LlStatus::NotConnected as i32;
pub const LL_TRANSPORT_ERROR: i32 = LlStatus::TransportError as i32;
pub const LL_OUT_OF_RESOURCES: i32 = LlStatus::OutOfResources as i32;
pub const LL_INVALID_ARGUMENT: i32 = LlStatus::InvalidArgument as i32;
pub const LL_NO_EVENT: i32 = LlStatus::NoEvent as i32;
pub const LL_INTERNAL: i32 = LlStatus::Internal as i32;

impl LlStatus {
    pub fn from_raw(raw: i32) -> Option<Self> {
        use LlStatus::*;
        Some(match raw {
            0 => Ok,
            1 => InvalidHandle,
            2 => DuplicateName,
            3 => NotFound,
            4 => UnknownSubject,
            5 => FormatError,
            6 => InvalidValue,
            7 => InvalidRotation,
            8 => NotConnected,
            9 => TransportError,
            10 => OutOfResources,
            11 => InvalidArgument,
            12 => NoEvent,
            13 => Internal,
            _ => return None,
        })
    }

    pub fn message(self) -> &'static CStr {
        match self {
            LlStatus::Ok => c"ok",
            LlStatus::InvalidHandle => c"invalid or destroyed provider handle",
            LlStatus::DuplicateName => c"name already in use",
            LlStatus::NotFound => c"not found",
            LlStatus::UnknownSubject => c"unknown subject id",
            LlStatus::FormatError => c"frame or schema does not match the expected layout",
            LlStatus::InvalidValue => c"non-finite value",
            LlStatus::InvalidRotation => c"rotation is not a unit quaternion",
            LlStatus::NotConnected => c"no engine connected; frame dropped",
            LlStatus::TransportError => c"transport error",
            LlStatus::OutOfResources => c"out of resources",
            LlStatus::InvalidArgument => c"invalid argument",
            LlStatus::NoEvent => c"no pending event",
            LlStatus::Internal => c"internal error",
        }
    }
}

impl From<&LiveLinkError> for LlStatus {
    fn from(err: &LiveLinkError) -> Self {
        match err {
            LiveLinkError::InvalidHandle(_) => LlStatus::InvalidHandle,
            LiveLinkError::DuplicateName(_) => LlStatus::DuplicateName,
            LiveLinkError::NotFound(_) => LlStatus::NotFound,
            LiveLinkError::UnknownSubject(_) => LlStatus::UnknownSubject,
            LiveLinkError::Codec(CodecError::Format(_)) => LlStatus::FormatError,
            LiveLinkError::Codec(CodecError::InvalidValue(_)) => LlStatus::InvalidValue,
            LiveLinkError::Codec(CodecError::InvalidRotation { .. }) => LlStatus::InvalidRotation,
            LiveLinkError::NotConnected(_) => LlStatus::NotConnected,
            LiveLinkError::Transport(_) | LiveLinkError::Io(_) => LlStatus::TransportError,
            LiveLinkError::OutOfResources(_)
            | LiveLinkError::Codec(CodecError::TooLarge { .. }) => LlStatus::OutOfResources,
            LiveLinkError::InvalidArgument(_) | LiveLinkError::Configuration(_) => {
                LlStatus::InvalidArgument
            }
        }
    }
}
