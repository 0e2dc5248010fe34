// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! The length-prefixed JSON wire protocol: framing, the message envelope,
//! and the canned response builders the request handler uses.

pub mod codec;
pub mod message;

pub use codec::{decode_message, encode_message, read_frame, write_frame, DEFAULT_MAX_FRAME_BYTES};
pub use message::{
    error_response, response_message, success_response, Message, MESSAGE_TYPE_PING,
    MESSAGE_TYPE_PRINT_JOB, MESSAGE_TYPE_RESPONSE, MESSAGE_TYPE_STATUS, PROTOCOL_VERSION,
};
