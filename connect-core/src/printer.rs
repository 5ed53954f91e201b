//! Seam to the local printer.
//!
//! Everything the planner needs from the device goes through this trait:
//! identity fingerprints for change detection, job control, print start, the
//! ready flag, connection configuration, and storage queries. Firmware backs
//! it with the real printer; the emulator and tests provide virtual ones.

use heapless::String;

/// Length of the identity fingerprint sent with download requests.
pub const FINGERPRINT_HDR_SIZE: usize = 16;

/// Maximum length of the configured server hostname.
pub const MAX_HOST_LEN: usize = 64;

/// Maximum length of the configured access token.
pub const MAX_TOKEN_LEN: usize = 64;

/// Job control operations the server may request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JobControl {
    Pause,
    Resume,
    Stop,
}

/// Connection configuration as stored on the printer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub host: String<MAX_HOST_LEN>,
    pub port: u16,
    pub token: String<MAX_TOKEN_LEN>,
    pub tls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
            token: String::new(),
            tls: false,
        }
    }
}

/// Identity details of the printer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PrinterInfo {
    pub fingerprint: [u8; FINGERPRINT_HDR_SIZE],
}

/// Device abstraction consumed by the planner.
pub trait Printer {
    /// Hash of the identity state advertised in Info events.
    fn info_fingerprint(&self) -> u64;

    /// Hash of the storage file listing.
    fn files_hash(&self) -> u64;

    /// Returns `true` while a print job is running.
    fn is_printing(&self) -> bool;

    /// Applies a job control operation; `false` when it does not apply to the
    /// current job state.
    fn job_control(&mut self, operation: JobControl) -> bool;

    /// Starts printing the given file; `false` when the printer cannot start
    /// now.
    fn start_print(&mut self, path: &str) -> bool;

    /// Sets or clears the ready flag. Clearing (`ready == false`) must always
    /// succeed.
    fn set_ready(&mut self, ready: bool) -> bool;

    /// Returns the connection configuration and whether it changed since the
    /// flag was last reset. The flag is cleared only when `reset_flag` is
    /// set.
    fn config(&mut self, reset_flag: bool) -> (Config, bool);

    /// Returns the printer identity details.
    fn printer_info(&self) -> PrinterInfo;

    /// Stat-like existence query against the printer storage. False
    /// negatives for permission problems are acceptable.
    fn file_exists(&self, path: &str) -> bool;
}
