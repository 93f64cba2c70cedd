// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation memory for Quarry.
//!
//! A bounded message ring per conversation key, shared by every run in the
//! process and injected into the pipeline explicitly.

pub mod store;

pub use store::ConversationMemory;
