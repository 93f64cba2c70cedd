// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Quarry pipeline tests.
//!
//! Deterministic stand-ins for the model-backed collaborators, a scripted
//! execution engine, and a harness that wires a real [`Pipeline`] to a
//! seeded temporary SQLite database.
//!
//! # Components
//!
//! - [`MockGenerator`] - scripted query generator that records its requests
//! - [`MockComposer`] - canned or failing answer composer
//! - [`ScriptedEngine`] - execution engine replaying scripted outcomes
//! - [`EventLog`] - assertions over a collected event sequence
//! - [`TestHarness`] - full pipeline over a seeded SQLite database
//!
//! [`Pipeline`]: quarry_pipeline::Pipeline

pub mod events;
pub mod harness;
pub mod mock_composer;
pub mod mock_generator;
pub mod scripted_engine;

pub use events::EventLog;
pub use harness::{seed_sample_database, TestHarness, TestHarnessBuilder};
pub use mock_composer::MockComposer;
pub use mock_generator::MockGenerator;
pub use scripted_engine::{EngineStep, ScriptedEngine};
