//! Seam to the file transfer engine.
//!
//! The planner never moves bytes itself. It watches transfers through the
//! monitor view, owns at most one download handle, and reports endings to the
//! server after the fact. Production backs this trait with the real transfer
//! engine; tests and the emulator substitute an in-memory rig.

/// Identifier of a transfer slot reservation.
pub type TransferId = u32;

/// How a finished transfer ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TransferOutcome {
    Finished,
    Error,
    Stopped,
}

/// Connection details for starting a server-initiated download.
#[derive(Copy, Clone, Debug)]
pub struct DownloadRequest<'a> {
    pub host: &'a str,
    pub port: u16,
    /// Path component of the request URL, already composed.
    pub url_path: &'a str,
    /// Destination path on the printer storage.
    pub local_path: &'a str,
    pub token: &'a str,
    /// Printer identity fingerprint sent with the request headers.
    pub fingerprint: &'a [u8],
}

/// Result of an attempt to start a download.
#[derive(Debug)]
pub enum DownloadStart<D> {
    /// The transfer slot was claimed and the connection is underway.
    Started(D),
    /// Another transfer already holds the slot.
    NoTransferSlot,
    /// The destination file is already present.
    AlreadyExists,
    /// The server refused the request.
    RefusedRequest,
    /// The storage layer failed; the message is forwarded verbatim.
    Storage { msg: &'static str },
}

/// Transfer engine view consumed by the planner.
pub trait TransferHost {
    /// Handle representing an active download owned by the planner.
    type Download;

    /// Id of the transfer currently holding the slot, if any.
    fn current_transfer(&self) -> Option<TransferId>;

    /// Outcome of a past transfer, if it is still within the kept history.
    fn outcome(&self, id: TransferId) -> Option<TransferOutcome>;

    /// Attempts to claim the transfer slot and start a download.
    fn start_connect_download(
        &mut self,
        request: &DownloadRequest<'_>,
    ) -> DownloadStart<Self::Download>;
}
