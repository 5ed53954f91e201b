//! The planner decides what the device does next on the server link.
//!
//! One owning task calls [`Planner::next_action`], executes the returned
//! action (send telemetry, send an event, or sleep), then reports back
//! through [`Planner::action_done`] before asking again. Commands received in
//! telemetry responses enter through [`Planner::command`]; background gcode
//! and download completions come back through their own entry points. Every
//! method is a short straight-line computation; all waiting happens outside.
//!
//! A note about time comparisons. The planner subtracts `now()` and some past
//! event, getting the length of the interval. This stays correct across the
//! 32-bit wrap because the subtraction underflows to the real interval
//! length. The intervals themselves are short under normal operation, and
//! once the silence grows long enough the planner schedules an Info event and
//! clears the relevant timers, so no stored timestamp ever ages beyond half
//! the modulus.

use core::fmt::Write as _;

use heapless::String;

use crate::changes::ChangeTracker;
use crate::command::{
    BackgroundCommand, BackgroundGcode, Command, CommandData, CommandId, MAX_HASH_LEN,
    path_allowed,
};
use crate::event::{Event, EventKind};
use crate::printer::{JobControl, Printer};
use crate::time::{Clock, Duration, Timestamp};
use crate::transfer::{DownloadRequest, DownloadStart, TransferHost, TransferId, TransferOutcome};

/// First retry after 100 ms.
pub const COOLDOWN_BASE: Duration = 100;
/// Retries never sparser than once a minute.
pub const COOLDOWN_MAX: Duration = 60 * 1_000;
/// Telemetry every 4 seconds while idle.
pub const TELEMETRY_INTERVAL_LONG: Duration = 4 * 1_000;
/// Telemetry every second while printing or processing something.
pub const TELEMETRY_INTERVAL_SHORT: Duration = 1_000;
/// Silence longer than this re-initializes the session with a fresh Info.
pub const RECONNECT_AFTER: Duration = 10 * 1_000;
/// Attempts per specific event before it is thrown out. The failure may be
/// tied to that one event (an oversized payload looks the same as a network
/// error from here), and retrying it forever would block everything else.
pub const GIVE_UP_AFTER_ATTEMPTS: u8 = 5;

/// Maximum length of the composed download URL path: prefix, decimal 64-bit
/// team id, infix, hash, suffix.
pub const MAX_DOWNLOAD_URL_LEN: usize =
    "/p/teams/".len() + 20 + "/files/".len() + MAX_HASH_LEN + "/raw".len();

/// How the transport fared with the last action.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActionResult {
    /// Delivered and acknowledged.
    Ok,
    /// Delivered, but the server refused it. The action is not retried.
    Refused,
    /// Not delivered; the planner backs off and retries.
    Failed,
}

/// How a background gcode command ended.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BackgroundResult {
    Success,
    Failure,
}

/// What the host should do next.
#[derive(Debug)]
pub enum Action<'a, D> {
    /// Send a telemetry report. An empty one carries no printer state.
    SendTelemetry { empty: bool },
    /// Send this event.
    Event(Event),
    /// Nothing to send; idle for the given amount.
    Sleep(Sleep<'a, D>),
}

/// An idle period, with the work the host may advance meanwhile.
#[derive(Debug)]
pub struct Sleep<'a, D> {
    duration: Duration,
    background: Option<&'a mut BackgroundCommand>,
    download: Option<&'a mut D>,
}

impl<'a, D> Sleep<'a, D> {
    /// How long to idle, in milliseconds.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Background command to chip away at during the sleep, if any.
    pub fn background_mut(&mut self) -> Option<&mut BackgroundCommand> {
        self.background.as_deref_mut()
    }

    /// Active download to advance during the sleep, if any.
    pub fn download_mut(&mut self) -> Option<&mut D> {
        self.download.as_deref_mut()
    }
}

/// Single-task coordinator between the printer and the server link.
pub struct Planner<P, C, T>
where
    T: TransferHost,
{
    printer: P,
    clock: C,
    transfers: T,
    info_changes: ChangeTracker,
    file_changes: ChangeTracker,
    /// At most one event waits to go out; it stays here until acknowledged.
    planned_event: Option<Event>,
    background_command: Option<BackgroundCommand>,
    /// Owning this handle keeps the transfer slot reserved.
    download: Option<T::Download>,
    /// Last monitor id reacted to; a difference means a transfer ended or
    /// started.
    observed_transfer: Option<TransferId>,
    transfer_start_cmd: Option<CommandId>,
    last_telemetry: Option<Timestamp>,
    last_success: Option<Timestamp>,
    cooldown: Option<Duration>,
    perform_cooldown: bool,
    failed_attempts: u8,
}

impl<P, C, T> Planner<P, C, T>
where
    P: Printer,
    C: Clock,
    T: TransferHost,
{
    /// Creates a planner owning its device, clock, and transfer seams.
    pub fn new(printer: P, clock: C, transfers: T) -> Self {
        Self {
            printer,
            clock,
            transfers,
            info_changes: ChangeTracker::new(),
            file_changes: ChangeTracker::new(),
            planned_event: None,
            background_command: None,
            download: None,
            observed_transfer: None,
            transfer_start_cmd: None,
            last_telemetry: None,
            last_success: None,
            cooldown: None,
            perform_cooldown: false,
            failed_attempts: 0,
        }
    }

    /// Accesses the printer.
    pub fn printer(&self) -> &P {
        &self.printer
    }

    /// Mutably accesses the printer.
    pub fn printer_mut(&mut self) -> &mut P {
        &mut self.printer
    }

    /// Accesses the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Mutably accesses the clock.
    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    /// Accesses the transfer engine view.
    pub fn transfers(&self) -> &T {
        &self.transfers
    }

    /// Mutably accesses the transfer engine view.
    pub fn transfers_mut(&mut self) -> &mut T {
        &mut self.transfers
    }

    /// Restarts the session bookkeeping after a hard restart of the link.
    ///
    /// Guarantees the next send is an Info even when no hash moved.
    pub fn reset(&mut self) {
        self.info_changes.mark_dirty();
        self.last_telemetry = None;
        self.cooldown = None;
        self.perform_cooldown = false;
        self.failed_attempts = 0;
    }

    fn since(&self, past: Option<Timestamp>) -> Option<Duration> {
        past.map(|past| self.clock.now().wrapping_since(past))
    }

    fn sleep(&mut self, amount: Duration) -> Action<'_, T::Download> {
        // A queued event has to go out before the background command may run
        // further. Processing it could generate another event, which would
        // overwrite the queued one.
        let has_event = self.planned_event.is_some();
        let background = if has_event {
            None
        } else {
            self.background_command.as_mut()
        };
        // Downloads are different. Their endings are observed passively
        // through the monitor and the event is generated after the fact, so
        // there is no reason to block the transfer on a queued event.
        let download = self.download.as_mut();

        Action::Sleep(Sleep {
            duration: amount,
            background,
            download,
        })
    }

    /// Decides the next thing to do on the link.
    pub fn next_action(&mut self) -> Action<'_, T::Download> {
        if self.perform_cooldown {
            self.perform_cooldown = false;
            let amount = self
                .cooldown
                .expect("cooldown interval is set whenever a cooldown is scheduled");
            return self.sleep(amount);
        }

        if let Some(event) = &self.planned_event {
            // Not taken out yet. The slot empties only after a successful
            // send.
            return Action::Event(event.clone());
        }

        // Both trackers must observe their hash, even when the first one
        // already decides the election.
        let info_changed = self.info_changes.set_hash(self.printer.info_fingerprint());
        let files_changed = self.file_changes.set_hash(self.printer.files_hash());
        if info_changed || files_changed {
            let mut event = Event::new(EventKind::Info);
            if self.file_changes.is_dirty() {
                event.info_rescan_files = true;
            }
            self.planned_event = Some(event.clone());
            return Action::Event(event);
        }

        let current = self.transfers.current_transfer();
        if current != self.observed_transfer {
            let terminated = self.observed_transfer;
            self.observed_transfer = current;

            if let Some(id) = terminated
                && let Some(outcome) = self.transfers.outcome(id)
            {
                let kind = match outcome {
                    TransferOutcome::Finished => EventKind::TransferFinished,
                    TransferOutcome::Error => EventKind::TransferAborted,
                    TransferOutcome::Stopped => EventKind::TransferStopped,
                };
                let mut event = Event::new(kind);
                event.transfer_id = Some(id);
                event.start_cmd_id = self.transfer_start_cmd.take();
                self.planned_event = Some(event.clone());
                return Action::Event(event);
            }
            // No event here. The old transfer either fell out of the monitor
            // history, or there was none and a new one just started.
        }

        if let Some(since_telemetry) = self.since(self.last_telemetry) {
            let interval = if self.printer.is_printing() || self.background_command.is_some() {
                TELEMETRY_INTERVAL_SHORT
            } else {
                TELEMETRY_INTERVAL_LONG
            };
            if since_telemetry >= interval {
                Action::SendTelemetry { empty: false }
            } else {
                self.sleep(interval - since_telemetry)
            }
        } else {
            // TODO: Decide when an empty telemetry would do instead of a full
            // one.
            Action::SendTelemetry { empty: false }
        }
    }

    /// Reports how the transport fared with the last returned action.
    pub fn action_done(&mut self, result: ActionResult) {
        match result {
            // A refused action is also dropped, it will not be retried.
            ActionResult::Ok | ActionResult::Refused => {
                let now = self.clock.now();
                self.last_success = Some(now);
                self.perform_cooldown = false;
                self.cooldown = None;
                self.failed_attempts = 0;
                if let Some(event) = self.planned_event.take() {
                    if event.kind == EventKind::Info {
                        self.info_changes.mark_clean();
                        if event.info_rescan_files {
                            self.file_changes.mark_clean();
                        }
                    }
                    // Enforce telemetry now. Its response may carry a new
                    // command.
                    self.last_telemetry = None;
                } else {
                    self.last_telemetry = Some(now);
                }
            }
            ActionResult::Failed => {
                self.failed_attempts += 1;
                if self.failed_attempts >= GIVE_UP_AFTER_ATTEMPTS {
                    // An Info is never dropped, the session cannot be
                    // re-established without one.
                    if self
                        .planned_event
                        .as_ref()
                        .is_some_and(|event| event.kind != EventKind::Info)
                    {
                        self.planned_event = None;
                    }
                    self.failed_attempts = 0;
                }

                if self.since(self.last_success).unwrap_or(0) >= RECONNECT_AFTER
                    && self.planned_event.is_none()
                {
                    // The server has heard nothing from us for a long time.
                    // Once a send gets through again, start over with a fresh
                    // Info.
                    self.planned_event = Some(Event::new(EventKind::Info));
                    self.last_success = None;
                }

                let doubled = self.cooldown.unwrap_or(COOLDOWN_BASE / 2).saturating_mul(2);
                self.cooldown = Some(doubled.min(COOLDOWN_MAX));
                self.perform_cooldown = true;
            }
        }
    }

    /// Interprets a command received in a telemetry response.
    pub fn command(&mut self, command: Command) {
        // Commands only arrive in telemetry responses, never while an event
        // waits to go out.
        debug_assert!(self.planned_event.is_none());

        if self.background_command.is_some() {
            // Already processing one. A re-send of the command being
            // processed is re-accepted; anything else has to wait its turn.
            let kind = if matches!(command.data, CommandData::ProcessingThisCommand) {
                EventKind::Accepted
            } else {
                EventKind::Rejected
            };
            self.planned_event = Some(Event::new(kind).with_command_id(command.id));
            return;
        }

        let id = command.id;
        match command.data {
            CommandData::Unknown => self.reject(id, "Unknown command"),
            CommandData::Broken { reason } => self.reject(id, reason),
            CommandData::GcodeTooLarge => self.reject(id, "GCode too large"),
            CommandData::ProcessingOtherCommand => self.reject(id, "Processing other command"),
            CommandData::ProcessingThisCommand => {
                // The parser produces this only while a background command is
                // active, and that case is handled above.
                debug_assert!(false, "ProcessingThisCommand without a background command");
                self.planned_event = Some(Event::new(EventKind::Rejected).with_command_id(id));
            }
            CommandData::Gcode { body } => {
                self.background_command = Some(BackgroundCommand {
                    id,
                    gcode: BackgroundGcode::new(body),
                });
                self.planned_event = Some(Event::accepted(id));
            }
            CommandData::PausePrint => self.job_control(id, JobControl::Pause, "No print to pause"),
            CommandData::ResumePrint => {
                self.job_control(id, JobControl::Resume, "No paused print to resume");
            }
            CommandData::StopPrint => self.job_control(id, JobControl::Stop, "No print to stop"),
            CommandData::StartPrint { path } => self.start_print(id, &path),
            CommandData::SendInfo => {
                self.planned_event = Some(Event::new(EventKind::Info).with_command_id(id));
            }
            CommandData::SendJobInfo { job_id } => {
                let mut event = Event::new(EventKind::JobInfo).with_command_id(id);
                event.job_id = Some(job_id);
                self.planned_event = Some(event);
            }
            CommandData::SendFileInfo { path } => {
                if path_allowed(&path) {
                    let mut event = Event::new(EventKind::FileInfo).with_command_id(id);
                    event.path = Some(path);
                    self.planned_event = Some(event);
                } else {
                    self.reject(id, "Forbidden path");
                }
            }
            CommandData::SendTransferInfo => {
                let mut event = Event::new(EventKind::TransferInfo).with_command_id(id);
                event.start_cmd_id = self.transfer_start_cmd;
                self.planned_event = Some(event);
            }
            CommandData::SetPrinterReady => {
                if self.printer.set_ready(true) {
                    self.planned_event = Some(Event::finished(id));
                } else {
                    self.reject(id, "Can't set ready now");
                }
            }
            CommandData::CancelPrinterReady => {
                let ok = self.printer.set_ready(false);
                // Clearing the ready flag always succeeds per the printer
                // contract.
                debug_assert!(ok);
                self.planned_event = Some(Event::finished(id));
            }
            CommandData::StartConnectDownload { team, hash, path } => {
                self.start_connect_download(id, team, &hash, &path);
            }
        }
    }

    fn reject(&mut self, id: CommandId, reason: &'static str) {
        self.planned_event = Some(Event::rejected(id, reason));
    }

    fn job_control(&mut self, id: CommandId, operation: JobControl, refusal: &'static str) {
        if self.printer.job_control(operation) {
            self.planned_event = Some(Event::finished(id));
        } else {
            self.reject(id, refusal);
        }
    }

    fn start_print(&mut self, id: CommandId, path: &str) {
        if !path_allowed(path) {
            self.reject(id, "Forbidden path");
        } else if !self.printer.file_exists(path) {
            self.reject(id, "File not found");
        } else if self.printer.start_print(path) {
            self.planned_event = Some(Event::finished(id));
        } else {
            self.reject(id, "Can't print now");
        }
    }

    fn start_connect_download(&mut self, id: CommandId, team: u64, hash: &str, local_path: &str) {
        // The change flag is left alone here; observing it belongs to the
        // session layer.
        let (config, config_changed) = self.printer.config(false);
        if config_changed {
            // A changed config means the command may still come from the
            // previous server. The new one would not have the file, and the
            // request would leak details it is not supposed to see.
            self.reject(id, "Switching config");
            return;
        }

        if config.tls {
            // TODO: Refuse only when no symmetric decryption key is loaded
            // once encrypted downloads exist.
            self.reject(id, "Encryption of downloads not supported");
            return;
        }

        let mut url_path: String<MAX_DOWNLOAD_URL_LEN> = String::new();
        write!(url_path, "/p/teams/{team}/files/{hash}/raw")
            .expect("download url fits its fixed buffer");

        let info = self.printer.printer_info();
        let request = DownloadRequest {
            host: &config.host,
            port: config.port,
            url_path: &url_path,
            local_path,
            token: &config.token,
            fingerprint: &info.fingerprint,
        };

        match self.transfers.start_connect_download(&request) {
            DownloadStart::Started(download) => {
                // Anything still transferring would have kept the slot and
                // the start would have failed.
                debug_assert!(self.download.is_none());
                self.download = Some(download);
                self.planned_event = Some(Event::finished(id));
                self.transfer_start_cmd = Some(id);
            }
            DownloadStart::NoTransferSlot => self.reject(id, "Another transfer in progress"),
            DownloadStart::AlreadyExists => self.reject(id, "File already exists"),
            DownloadStart::RefusedRequest => self.reject(id, "Failed to download"),
            DownloadStart::Storage { msg } => self.reject(id, msg),
        }
    }

    /// Id of the background command being processed, for event correlation.
    pub fn background_command_id(&self) -> Option<CommandId> {
        self.background_command.as_ref().map(|command| command.id)
    }

    /// Whether an event is waiting to go out. Hosts must not feed commands
    /// while this holds.
    pub fn event_pending(&self) -> bool {
        self.planned_event.is_some()
    }

    /// Reports that the background gcode command finished.
    pub fn background_done(&mut self, result: BackgroundResult) {
        // The background command is handed out only through sleeps, and only
        // when no event is queued, so its completion cannot race one.
        debug_assert!(self.planned_event.is_none());
        debug_assert!(self.background_command.is_some());

        let kind = match result {
            BackgroundResult::Success => EventKind::Finished,
            BackgroundResult::Failure => EventKind::Failed,
        };
        let mut event = Event::new(kind);
        event.command_id = self.background_command_id();
        self.planned_event = Some(event);
        self.background_command = None;
    }

    /// Reports that the active download finished, releasing the slot.
    ///
    /// No event is queued here. Transfer endings are observed through the
    /// monitor on a later wake-up; this only records the id in case no
    /// wake-up happened while the transfer was still listed.
    pub fn download_done(&mut self) {
        debug_assert!(self.download.is_some());

        self.observed_transfer = self.transfers.current_transfer();
        // The handle being dropped below still holds the slot right now.
        debug_assert!(self.observed_transfer.is_some());
        self.download = None;
    }
}
