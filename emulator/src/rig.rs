//! Virtual printer, scripted clock, and in-memory transfer engine.
//!
//! The rig gives the emulator a fully controllable device: hashes and flags
//! are plain fields the session pokes through the planner's accessors, the
//! clock only moves when told to, and transfers live entirely in memory.

use std::collections::BTreeSet;

use connect_core::printer::{Config, FINGERPRINT_HDR_SIZE, JobControl, Printer, PrinterInfo};
use connect_core::time::{Clock, Duration, Timestamp};
use connect_core::transfer::{
    DownloadRequest, DownloadStart, TransferHost, TransferId, TransferOutcome,
};

/// Millisecond clock that advances only when the session says so.
pub struct ScriptClock {
    now: Timestamp,
}

impl ScriptClock {
    pub fn new() -> Self {
        Self {
            now: Timestamp::from_millis(0),
        }
    }

    pub fn advance(&mut self, amount: Duration) {
        self.now = self.now.wrapping_add(amount);
    }

    pub fn now_millis(&self) -> u32 {
        self.now.as_millis()
    }
}

impl Clock for ScriptClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}

impl Default for ScriptClock {
    fn default() -> Self {
        Self::new()
    }
}

/// In-memory printer with scriptable identity and job state.
pub struct VirtualPrinter {
    pub fingerprint: u64,
    pub printing: bool,
    pub paused: bool,
    pub ready: bool,
    pub config: Config,
    pub config_changed: bool,
    files: BTreeSet<String>,
}

impl VirtualPrinter {
    pub fn new() -> Self {
        let mut config = Config::default();
        config
            .host
            .push_str("connect.local")
            .expect("default host fits the config buffer");
        config.port = 8080;
        config
            .token
            .push_str("emulator-token")
            .expect("default token fits the config buffer");

        Self {
            fingerprint: 0x5157_4a21,
            printing: false,
            paused: false,
            ready: false,
            config,
            config_changed: false,
            files: BTreeSet::new(),
        }
    }

    /// Creates a file on the virtual storage.
    pub fn touch(&mut self, path: &str) {
        self.files.insert(path.to_string());
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

impl Default for VirtualPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(seed: u64, bytes: &[u8]) -> u64 {
    let mut hash = seed ^ 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

impl Printer for VirtualPrinter {
    fn info_fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn files_hash(&self) -> u64 {
        self.files
            .iter()
            .fold(0, |hash, name| fnv1a(hash, name.as_bytes()))
    }

    fn is_printing(&self) -> bool {
        self.printing
    }

    fn job_control(&mut self, operation: JobControl) -> bool {
        match operation {
            JobControl::Pause => {
                if self.printing && !self.paused {
                    self.paused = true;
                    true
                } else {
                    false
                }
            }
            JobControl::Resume => {
                if self.paused {
                    self.paused = false;
                    true
                } else {
                    false
                }
            }
            JobControl::Stop => {
                if self.printing {
                    self.printing = false;
                    self.paused = false;
                    true
                } else {
                    false
                }
            }
        }
    }

    fn start_print(&mut self, _path: &str) -> bool {
        if self.printing {
            return false;
        }

        self.printing = true;
        self.ready = false;
        true
    }

    fn set_ready(&mut self, ready: bool) -> bool {
        if ready && self.printing {
            return false;
        }

        self.ready = ready;
        true
    }

    fn config(&mut self, reset_flag: bool) -> (Config, bool) {
        let changed = self.config_changed;
        if reset_flag {
            self.config_changed = false;
        }
        (self.config.clone(), changed)
    }

    fn printer_info(&self) -> PrinterInfo {
        let mut fingerprint = [0u8; FINGERPRINT_HDR_SIZE];
        let digest = fnv1a(self.fingerprint, b"printer-identity");
        fingerprint[..8].copy_from_slice(&self.fingerprint.to_be_bytes());
        fingerprint[8..].copy_from_slice(&digest.to_be_bytes());
        PrinterInfo { fingerprint }
    }

    fn file_exists(&self, path: &str) -> bool {
        self.files.contains(path)
    }
}

/// Handle the planner owns while a virtual transfer runs.
#[derive(Debug)]
pub struct ActiveDownload {
    pub transfer: TransferId,
    pub url_path: String,
    pub local_path: String,
}

/// Scripted refusal for the next download start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RigRefusal {
    Exists,
    Request,
    Storage,
}

/// Single-slot transfer engine keeping its history in memory.
pub struct TransferRig {
    current: Option<TransferId>,
    next_id: TransferId,
    history: Vec<(TransferId, TransferOutcome)>,
    pub refuse_next: Option<RigRefusal>,
}

impl TransferRig {
    pub fn new() -> Self {
        Self {
            current: None,
            next_id: 1,
            history: Vec::new(),
            refuse_next: None,
        }
    }

    pub fn current_id(&self) -> Option<TransferId> {
        self.current
    }

    /// Records the outcome of the running transfer. The slot stays claimed
    /// until [`release`](Self::release), matching how the engine keeps the
    /// reservation alive while the download handle still exists.
    pub fn finish(&mut self, outcome: TransferOutcome) -> Option<TransferId> {
        let id = self.current?;
        self.history.push((id, outcome));
        Some(id)
    }

    /// Releases the transfer slot.
    pub fn release(&mut self) {
        self.current = None;
    }
}

impl Default for TransferRig {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferHost for TransferRig {
    type Download = ActiveDownload;

    fn current_transfer(&self) -> Option<TransferId> {
        self.current
    }

    fn outcome(&self, id: TransferId) -> Option<TransferOutcome> {
        self.history
            .iter()
            .rev()
            .find(|(recorded, _)| *recorded == id)
            .map(|(_, outcome)| *outcome)
    }

    fn start_connect_download(
        &mut self,
        request: &DownloadRequest<'_>,
    ) -> DownloadStart<Self::Download> {
        match self.refuse_next.take() {
            Some(RigRefusal::Exists) => return DownloadStart::AlreadyExists,
            Some(RigRefusal::Request) => return DownloadStart::RefusedRequest,
            Some(RigRefusal::Storage) => {
                return DownloadStart::Storage {
                    msg: "Not enough space",
                };
            }
            None => {}
        }

        if self.current.is_some() {
            return DownloadStart::NoTransferSlot;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.current = Some(id);
        DownloadStart::Started(ActiveDownload {
            transfer: id,
            url_path: request.url_path.to_string(),
            local_path: request.local_path.to_string(),
        })
    }
}
