//! Wraps a [`Command`] with the `commandId`/`responseRequired` pair every
//! `BaseCommand` carries on the wire (spec.md §4.2). Kept as a separate
//! envelope type rather than a field on every command struct, the same way
//! `hdbconnect_impl`'s protocol layer keeps its `Request`/`Reply` wrappers
//! distinct from the `Part` payloads they carry.

use crate::command::Command;

#[derive(Debug, Clone)]
pub struct CommandEnvelope {
    pub command_id: i32,
    pub response_required: bool,
    pub command: Command,
}

impl CommandEnvelope {
    pub fn oneway(command_id: i32, command: Command) -> Self {
        Self {
            command_id,
            response_required: false,
            command,
        }
    }

    pub fn request(command_id: i32, command: Command) -> Self {
        Self {
            command_id,
            response_required: true,
            command,
        }
    }
}
