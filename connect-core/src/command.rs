//! Server command catalog and background command state.
//!
//! Commands arrive already parsed into the closed [`CommandData`] set; the
//! parser itself lives with the transport. Malformed input still travels
//! through here as the `Unknown` / `Broken` / `GcodeTooLarge` variants so the
//! planner can reply with the matching rejection.

use heapless::{String, Vec};

/// Identifier the server attaches to each command, echoed in replies.
pub type CommandId = u32;

/// Identifier of a print job on the printer side.
pub type JobId = u32;

/// Maximum length of a file path on the printer storage.
pub const MAX_PATH_LEN: usize = 96;

/// Maximum length of a download file hash.
pub const MAX_HASH_LEN: usize = 64;

/// Maximum size of a gcode body submitted through a command.
pub const MAX_GCODE_LEN: usize = 512;

/// Bounded file path buffer.
pub type FilePath = String<MAX_PATH_LEN>;

/// Bounded download hash buffer.
pub type DownloadHash = String<MAX_HASH_LEN>;

/// Bounded gcode body buffer.
pub type GcodeBody = Vec<u8, MAX_GCODE_LEN>;

/// A command received from the server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub data: CommandData,
}

/// The closed set of commands the server may send.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CommandData {
    /// Command name not recognized by the parser.
    Unknown,
    /// Command recognized but malformed; the parser supplies the reason.
    Broken { reason: &'static str },
    /// Gcode command whose body exceeded the shared buffer.
    GcodeTooLarge,
    /// Re-sent command other than the one currently being processed.
    ProcessingOtherCommand,
    /// Re-sent command that is currently being processed.
    ProcessingThisCommand,
    /// Gcode to execute as a background command.
    Gcode { body: GcodeBody },
    PausePrint,
    ResumePrint,
    StopPrint,
    StartPrint { path: FilePath },
    SendInfo,
    SendJobInfo { job_id: JobId },
    SendFileInfo { path: FilePath },
    SendTransferInfo,
    SetPrinterReady,
    CancelPrinterReady,
    StartConnectDownload {
        team: u64,
        hash: DownloadHash,
        path: FilePath,
    },
}

/// Gcode stream being executed asynchronously by the host.
///
/// The host advances `offset` while the planner sleeps; completion is
/// reported back through `background_done`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackgroundGcode {
    data: GcodeBody,
    offset: usize,
}

impl BackgroundGcode {
    /// Wraps a gcode body with no progress yet.
    #[must_use]
    pub fn new(data: GcodeBody) -> Self {
        Self { data, offset: 0 }
    }

    /// Returns the bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    /// Records that `amount` more bytes were consumed, saturating at the end.
    pub fn advance(&mut self, amount: usize) {
        self.offset = (self.offset + amount).min(self.data.len());
    }

    /// Returns `true` once the whole body has been consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.offset == self.data.len()
    }
}

/// The background command, at most one of which exists at any time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BackgroundCommand {
    pub id: CommandId,
    pub gcode: BackgroundGcode,
}

/// Returns `true` when `path` may be touched on behalf of the server.
///
/// Only the USB storage subtree is reachable, and parent traversal is
/// refused. Bare `/usb` itself counts as reachable.
#[must_use]
pub fn path_allowed(path: &str) -> bool {
    let on_usb = path.starts_with("/usb/") || path == "/usb";
    on_usb && !path.contains("/../")
}
