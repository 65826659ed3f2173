// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod channels;
pub mod contacts;
pub mod messages;
pub mod queue;
pub mod tickets;
