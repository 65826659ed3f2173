// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Zapdesk integration tests.
//!
//! Provides a mock channel driver and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a real messaging network.
//!
//! # Components
//!
//! - [`MockDriver`] - Scriptable channel driver with send capture and failure injection
//! - [`TestHarness`] - Full dispatch stack over a temp SQLite database
//! - [`storage`] - Temp storage and seed rows for lower-level tests

pub mod harness;
pub mod mock_channel;
pub mod storage;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_channel::{MockDriver, SentMessage};
