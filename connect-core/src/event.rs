//! Outbound event catalog.
//!
//! Events are the only channel through which the server learns anything:
//! command acknowledgements, job and file descriptions, transfer endings, and
//! the Info self-description that (re)establishes a session. Each variant
//! serializes under the uppercase tag returned by [`EventKind::as_str`].

use core::fmt;

use crate::command::{CommandId, FilePath, JobId};
use crate::transfer::TransferId;

/// Discriminant of an outbound event.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EventKind {
    Info,
    Accepted,
    Rejected,
    JobInfo,
    FileInfo,
    TransferInfo,
    Finished,
    Failed,
    TransferStopped,
    TransferAborted,
    TransferFinished,
}

impl EventKind {
    /// Wire tag of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Info => "INFO",
            EventKind::Accepted => "ACCEPTED",
            EventKind::Rejected => "REJECTED",
            EventKind::JobInfo => "JOB_INFO",
            EventKind::FileInfo => "FILE_INFO",
            EventKind::TransferInfo => "TRANSFER_INFO",
            EventKind::Finished => "FINISHED",
            EventKind::Failed => "FAILED",
            EventKind::TransferStopped => "TRANSFER_STOPPED",
            EventKind::TransferAborted => "TRANSFER_ABORTED",
            EventKind::TransferFinished => "TRANSFER_FINISHED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound event with its optional correlation fields.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    /// Command this event acknowledges or answers.
    pub command_id: Option<CommandId>,
    pub job_id: Option<JobId>,
    pub path: Option<FilePath>,
    /// Human-readable explanation for REJECTED / FAILED.
    pub reason: Option<&'static str>,
    pub transfer_id: Option<TransferId>,
    /// Command that started the transfer this event refers to.
    pub start_cmd_id: Option<CommandId>,
    /// Whether an Info advertises a fresh file listing scan.
    pub info_rescan_files: bool,
}

impl Event {
    /// Creates an event with no correlation fields set.
    #[must_use]
    pub const fn new(kind: EventKind) -> Self {
        Self {
            kind,
            command_id: None,
            job_id: None,
            path: None,
            reason: None,
            transfer_id: None,
            start_cmd_id: None,
            info_rescan_files: false,
        }
    }

    /// Attaches the command this event answers.
    #[must_use]
    pub fn with_command_id(mut self, id: CommandId) -> Self {
        self.command_id = Some(id);
        self
    }

    /// ACCEPTED reply to a command.
    #[must_use]
    pub fn accepted(id: CommandId) -> Self {
        Self::new(EventKind::Accepted).with_command_id(id)
    }

    /// FINISHED reply to a command.
    #[must_use]
    pub fn finished(id: CommandId) -> Self {
        Self::new(EventKind::Finished).with_command_id(id)
    }

    /// REJECTED reply to a command, with the reason the server displays.
    #[must_use]
    pub fn rejected(id: CommandId, reason: &'static str) -> Self {
        let mut event = Self::new(EventKind::Rejected).with_command_id(id);
        event.reason = Some(reason);
        event
    }
}
