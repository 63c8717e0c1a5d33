// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workers: lifecycle state and the consumer traits

mod state;
mod traits;

pub use state::{WorkerState, WorkerStatus};
pub use traits::{EventHandler, EventWorker, HandlerError, WorkerSettings};
