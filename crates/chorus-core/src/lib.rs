//! # chorus-core
//!
//! Shared vocabulary for the chorus chat service.
//!
//! Contains the pieces both sides of the wire agree on:
//!
//! - [`ConnectionId`]: opaque handle for one live connection
//! - [`ClientFrame`] / [`ServerFrame`]: the typed wire envelope
//! - [`FrameCodec`] / [`encode_frame`]: newline-delimited JSON framing
//! - [`ReconnectPolicy`]: injectable backoff for the client reconnect loop

#![deny(unsafe_code)]

pub mod codec;
pub mod frame;
pub mod ids;
pub mod reconnect;

pub use codec::{encode_frame, FrameCodec, FrameError, DEFAULT_MAX_FRAME_LEN};
pub use frame::{ClientFrame, ServerFrame, OPERATOR_NAME};
pub use ids::ConnectionId;
pub use reconnect::{FixedDelay, ReconnectPolicy, DEFAULT_RECONNECT_DELAY};
