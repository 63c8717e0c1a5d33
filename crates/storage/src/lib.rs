// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Durable storage for the stream-backed bus

mod entry;
mod error;
mod stream;

pub use entry::{StreamEntry, StreamRecord};
pub use error::StreamError;
pub use stream::{EventStream, PendingDelivery, StartPosition};
