// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

/// Terminal error kinds a hub invocation can observe.
///
/// Transport failures are propagated as the underlying I/O error with
/// context; everything the connection core produces itself is one of these,
/// so callers can `downcast_ref::<HubError>()` on an `anyhow::Error` to tell
/// the kinds apart.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    /// The call was attempted (or still outstanding) after `dispose()` began.
    #[error("connection disposed")]
    Disposed,

    /// The invocation was terminated because the channel shut down.
    #[error("invocation cancelled by connection shutdown")]
    Cancelled,

    /// The server completed the invocation with an error frame.
    #[error("server error: {0}")]
    Server(String),

    /// The response payload could not be decoded to the expected type.
    #[error("decode error: {0}")]
    Decode(String),
}
