//! Scripted printer, clock, and transfer fakes driving the planner in tests.

use connect_core::command::{Command, CommandData, CommandId, DownloadHash, FilePath, GcodeBody};
use connect_core::event::{Event, EventKind};
use connect_core::planner::{Action, ActionResult, Planner};
use connect_core::printer::{Config, FINGERPRINT_HDR_SIZE, JobControl, Printer, PrinterInfo};
use connect_core::time::{Clock, Duration, Timestamp};
use connect_core::transfer::{
    DownloadRequest, DownloadStart, TransferHost, TransferId, TransferOutcome,
};

pub struct FakeClock {
    now: Timestamp,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Timestamp::from_millis(0),
        }
    }

    pub fn advance(&mut self, amount: Duration) {
        self.now = self.now.wrapping_add(amount);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Timestamp {
        self.now
    }
}

pub struct FakePrinter {
    pub fingerprint: u64,
    pub files: u64,
    pub printing: bool,
    pub job_control_ok: bool,
    pub start_print_ok: bool,
    pub set_ready_ok: bool,
    pub config: Config,
    pub config_changed: bool,
    pub existing: Vec<String>,
    pub job_controls: Vec<JobControl>,
    pub started: Vec<String>,
    pub ready_calls: Vec<bool>,
}

impl FakePrinter {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.host.push_str("connect.example.com").unwrap();
        config.port = 8080;
        config.token.push_str("token-123").unwrap();

        Self {
            fingerprint: 0xA,
            files: 0xB,
            printing: false,
            job_control_ok: true,
            start_print_ok: true,
            set_ready_ok: true,
            config,
            config_changed: false,
            existing: Vec::new(),
            job_controls: Vec::new(),
            started: Vec::new(),
            ready_calls: Vec::new(),
        }
    }

    pub fn touch(&mut self, path: &str) {
        self.existing.push(path.to_string());
    }
}

impl Printer for FakePrinter {
    fn info_fingerprint(&self) -> u64 {
        self.fingerprint
    }

    fn files_hash(&self) -> u64 {
        self.files
    }

    fn is_printing(&self) -> bool {
        self.printing
    }

    fn job_control(&mut self, operation: JobControl) -> bool {
        self.job_controls.push(operation);
        self.job_control_ok
    }

    fn start_print(&mut self, path: &str) -> bool {
        self.started.push(path.to_string());
        self.start_print_ok
    }

    fn set_ready(&mut self, ready: bool) -> bool {
        self.ready_calls.push(ready);
        if ready { self.set_ready_ok } else { true }
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
        fingerprint[..8].copy_from_slice(&self.fingerprint.to_be_bytes());
        PrinterInfo { fingerprint }
    }

    fn file_exists(&self, path: &str) -> bool {
        self.existing.iter().any(|existing| existing == path)
    }
}

pub enum NextStart {
    Start,
    NoSlot,
    Exists,
    Refused,
    Storage(&'static str),
}

#[derive(Debug)]
pub struct FakeDownload {
    pub id: TransferId,
}

pub struct RecordedRequest {
    pub host: String,
    pub port: u16,
    pub url_path: String,
    pub local_path: String,
    pub token: String,
    pub fingerprint: Vec<u8>,
}

pub struct FakeTransfers {
    pub current: Option<TransferId>,
    pub outcomes: Vec<(TransferId, TransferOutcome)>,
    pub next_start: NextStart,
    pub next_id: TransferId,
    pub requests: Vec<RecordedRequest>,
}

impl FakeTransfers {
    pub fn new() -> Self {
        Self {
            current: None,
            outcomes: Vec::new(),
            next_start: NextStart::Start,
            next_id: 1,
            requests: Vec::new(),
        }
    }
}

impl TransferHost for FakeTransfers {
    type Download = FakeDownload;

    fn current_transfer(&self) -> Option<TransferId> {
        self.current
    }

    fn outcome(&self, id: TransferId) -> Option<TransferOutcome> {
        self.outcomes
            .iter()
            .rev()
            .find(|(recorded, _)| *recorded == id)
            .map(|(_, outcome)| *outcome)
    }

    fn start_connect_download(
        &mut self,
        request: &DownloadRequest<'_>,
    ) -> DownloadStart<Self::Download> {
        self.requests.push(RecordedRequest {
            host: request.host.to_string(),
            port: request.port,
            url_path: request.url_path.to_string(),
            local_path: request.local_path.to_string(),
            token: request.token.to_string(),
            fingerprint: request.fingerprint.to_vec(),
        });

        match self.next_start {
            NextStart::Start => {
                let id = self.next_id;
                self.next_id += 1;
                self.current = Some(id);
                DownloadStart::Started(FakeDownload { id })
            }
            NextStart::NoSlot => DownloadStart::NoTransferSlot,
            NextStart::Exists => DownloadStart::AlreadyExists,
            NextStart::Refused => DownloadStart::RefusedRequest,
            NextStart::Storage(msg) => DownloadStart::Storage { msg },
        }
    }
}

pub type TestPlanner = Planner<FakePrinter, FakeClock, FakeTransfers>;

pub fn planner() -> TestPlanner {
    Planner::new(FakePrinter::new(), FakeClock::new(), FakeTransfers::new())
}

/// Owned summary of a planner action, so tests can keep poking the planner.
#[derive(Debug)]
pub enum Next {
    Telemetry { empty: bool },
    Event(Event),
    Sleep(SleepSummary),
}

#[derive(Debug)]
pub struct SleepSummary {
    pub duration: Duration,
    pub background: Option<CommandId>,
    pub download: Option<TransferId>,
}

pub fn next(planner: &mut TestPlanner) -> Next {
    match planner.next_action() {
        Action::SendTelemetry { empty } => Next::Telemetry { empty },
        Action::Event(event) => Next::Event(event),
        Action::Sleep(mut sleep) => Next::Sleep(SleepSummary {
            duration: sleep.duration(),
            background: sleep.background_mut().map(|command| command.id),
            download: sleep.download_mut().map(|download| download.id),
        }),
    }
}

pub fn expect_event(planner: &mut TestPlanner) -> Event {
    match next(planner) {
        Next::Event(event) => event,
        other => panic!("expected an event, got {other:?}"),
    }
}

pub fn expect_sleep(planner: &mut TestPlanner) -> SleepSummary {
    match next(planner) {
        Next::Sleep(sleep) => sleep,
        other => panic!("expected a sleep, got {other:?}"),
    }
}

pub fn expect_telemetry(planner: &mut TestPlanner) -> bool {
    match next(planner) {
        Next::Telemetry { empty } => empty,
        other => panic!("expected telemetry, got {other:?}"),
    }
}

pub fn send(planner: &mut TestPlanner, id: CommandId, data: CommandData) {
    planner.command(Command { id, data });
}

pub fn file_path(path: &str) -> FilePath {
    FilePath::try_from(path).unwrap()
}

pub fn download_hash(hash: &str) -> DownloadHash {
    DownloadHash::try_from(hash).unwrap()
}

pub fn gcode_body(gcode: &str) -> GcodeBody {
    GcodeBody::from_slice(gcode.as_bytes()).unwrap()
}

/// Drives a fresh planner through the cold-start Info and the first
/// telemetry, leaving it idle with the telemetry timer just set.
pub fn settle(planner: &mut TestPlanner) {
    let info = expect_event(planner);
    assert_eq!(info.kind, EventKind::Info);
    assert!(info.info_rescan_files);
    planner.action_done(ActionResult::Ok);

    assert!(!expect_telemetry(planner));
    planner.action_done(ActionResult::Ok);
}
