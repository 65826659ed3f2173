// SPDX-FileCopyrightText: 2026 Zapdesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types live in `zapdesk-core::types` so they can cross the
//! adapter trait boundary. This module re-exports the ones the query modules
//! read and write.

pub use zapdesk_core::types::{
    Channel, ChannelStatus, Contact, ContactFilter, ContactWrite, JobFailure, Message, NewContact,
    NewTicket, QueueEntry, Ticket, TicketGuard, TicketStatus,
};
