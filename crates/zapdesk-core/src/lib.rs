// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Zapdesk.
//!
//! This crate provides the error taxonomy, domain records, and the
//! collaborator traits (channel driver, storage) the dispatch subsystem is
//! written against.

pub mod error;
pub mod traits;
pub mod types;

pub use error::ZapdeskError;
pub use types::{
    AdapterType, CanonicalAddress, Channel, ChannelStatus, Contact, DispatchJob, EntityKind,
    EventAction, HealthStatus, MediaRef, Message, MessageRequest, TenantContext, Ticket,
    TicketPatch, TicketStatus,
};

pub use traits::{ChannelDriver, PluginAdapter, StorageAdapter};
