// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format: requests are JSON objects with a `type` field, responses and
//! pushes share one envelope.

pub mod codec;
pub mod message;
pub mod response;

pub use codec::{decode, encode};
pub use message::Message;
pub use response::Response;
