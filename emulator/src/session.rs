use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use connect_core::command::{Command, CommandData, CommandId, DownloadHash, FilePath, GcodeBody};
use connect_core::event::Event;
use connect_core::planner::{Action, ActionResult, BackgroundResult, Planner};
use connect_core::transfer::TransferOutcome;

use crate::rig::{RigRefusal, ScriptClock, TransferRig, VirtualPrinter};

/// Bytes of gcode the host chews through per sleep.
const GCODE_CHUNK: usize = 48;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "step",
        "step                          - ask the planner for its next action",
    ),
    (
        "done",
        "done <ok|refused|failed>      - report how the transport fared",
    ),
    (
        "send",
        "send <id> <command> [args]    - feed a server command (try `help send`)",
    ),
    (
        "advance",
        "advance <ms>                  - move the scripted clock forward",
    ),
    (
        "gcode-done",
        "gcode-done <ok|failed>        - finish the background gcode command",
    ),
    (
        "download",
        "download <finish|stop|abort>  - end the running transfer (or `refuse <why>`)",
    ),
    (
        "printer",
        "printer <knob> [value]        - poke the virtual printer (try `help printer`)",
    ),
    (
        "status",
        "status                        - display planner and device state",
    ),
    (
        "reset",
        "reset                         - restart the session bookkeeping",
    ),
];

const SEND_HELP: &[&str] = &[
    "send <id> unknown|broken|gcode-too-large|processing-other|processing-this",
    "send <id> gcode <text...>",
    "send <id> pause|resume|stop",
    "send <id> start-print <path>",
    "send <id> info | job-info <job> | file-info <path> | transfer-info",
    "send <id> ready | cancel-ready",
    "send <id> download <team> <hash> <path>",
];

const PRINTER_HELP: &[&str] = &[
    "printer fingerprint <hex>   - change the identity fingerprint",
    "printer touch <path>        - create a file on the virtual storage",
    "printer printing <on|off>   - toggle the running print",
    "printer tls <on|off>        - toggle TLS in the connection config",
    "printer config-changed      - flag the connection config as changed",
];

pub type EmulatedPlanner = Planner<VirtualPrinter, ScriptClock, TransferRig>;

pub struct Session {
    planner: EmulatedPlanner,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(log_path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = log_path.into();
        let transcript = TranscriptLogger::new(&path)?;
        let planner = Planner::new(VirtualPrinter::new(), ScriptClock::new(), TransferRig::new());

        Ok(Self {
            planner,
            transcript,
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.planner.clock().now_millis();
        self.transcript
            .append_line(now, TranscriptRole::Host, trimmed)?;

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        let lines = match tokens[0] {
            "help" => self.handle_help(tokens.get(1).copied()),
            "status" => self.handle_status(),
            "advance" => self.handle_advance(&tokens[1..]),
            "step" => self.handle_step(),
            "done" => self.handle_done(&tokens[1..]),
            "send" => self.handle_send(&tokens[1..]),
            "gcode-done" => self.handle_gcode_done(&tokens[1..]),
            "download" => self.handle_download(&tokens[1..]),
            "printer" => self.handle_printer(&tokens[1..]),
            "reset" => {
                self.planner.reset();
                vec!["OK reset".to_string()]
            }
            other => vec![format!("ERR unknown command `{other}` (try `help`)")],
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    fn handle_help(&mut self, topic: Option<&str>) -> Vec<String> {
        let mut lines = Vec::new();
        match topic {
            Some("send") => lines.extend(SEND_HELP.iter().map(|entry| entry.to_string())),
            Some("printer") => lines.extend(PRINTER_HELP.iter().map(|entry| entry.to_string())),
            Some(target) => {
                if let Some((_, detail)) = HELP_TOPICS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(target))
                {
                    lines.push((*detail).to_string());
                } else {
                    lines.push(format!("No help available for `{target}`."));
                }
            }
            None => {
                lines.push("Available commands:".to_string());
                for (_, detail) in HELP_TOPICS {
                    lines.push(format!("  {detail}"));
                }
                lines.push("Type `help <topic>` for a specific command.".to_string());
            }
        }
        lines
    }

    fn handle_status(&mut self) -> Vec<String> {
        let background = match self.planner.background_command_id() {
            Some(id) => format!("cmd={id}"),
            None => "none".to_string(),
        };
        let transfer = match self.planner.transfers().current_id() {
            Some(id) => format!("id={id}"),
            None => "none".to_string(),
        };
        let printer = self.planner.printer();
        let job = if printer.paused {
            "paused"
        } else if printer.printing {
            "printing"
        } else {
            "idle"
        };

        vec![format!(
            "clock={}ms job={} ready={} files={} background={} transfer={} event-pending={}",
            self.planner.clock().now_millis(),
            job,
            printer.ready,
            printer.file_count(),
            background,
            transfer,
            self.planner.event_pending(),
        )]
    }

    fn handle_advance(&mut self, args: &[&str]) -> Vec<String> {
        let Some(amount) = args.first().and_then(|raw| raw.parse::<u32>().ok()) else {
            return vec!["ERR advance expects a millisecond count".to_string()];
        };

        self.planner.clock_mut().advance(amount);
        vec![format!("OK clock={}ms", self.planner.clock().now_millis())]
    }

    fn handle_step(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        let mut honour_sleep = None;

        match self.planner.next_action() {
            Action::SendTelemetry { empty } => {
                lines.push(format!(
                    "ACTION telemetry empty={empty} (report with `done`)"
                ));
            }
            Action::Event(event) => {
                lines.push(format!(
                    "ACTION event {} (report with `done`)",
                    describe_event(&event)
                ));
            }
            Action::Sleep(mut sleep) => {
                lines.push(format!("ACTION sleep {}ms", sleep.duration()));
                if let Some(command) = sleep.background_mut() {
                    let chunk = command.gcode.remaining().len().min(GCODE_CHUNK);
                    command.gcode.advance(chunk);
                    lines.push(format!(
                        "  background cmd={} consumed {}B, {}B left",
                        command.id,
                        chunk,
                        command.gcode.remaining().len()
                    ));
                }
                if let Some(download) = sleep.download_mut() {
                    lines.push(format!(
                        "  download transfer={} -> {} running",
                        download.transfer, download.local_path
                    ));
                }
                honour_sleep = Some(sleep.duration());
            }
        }

        if let Some(amount) = honour_sleep {
            self.planner.clock_mut().advance(amount);
            lines.push(format!(
                "  slept, clock={}ms",
                self.planner.clock().now_millis()
            ));
        }

        lines
    }

    fn handle_done(&mut self, args: &[&str]) -> Vec<String> {
        let (result, label) = match args.first().copied() {
            Some("ok") => (ActionResult::Ok, "ok"),
            Some("refused") => (ActionResult::Refused, "refused"),
            Some("failed") => (ActionResult::Failed, "failed"),
            _ => return vec!["ERR done expects ok, refused, or failed".to_string()],
        };

        self.planner.action_done(result);
        vec![format!("OK done {label}")]
    }

    fn handle_send(&mut self, args: &[&str]) -> Vec<String> {
        if self.planner.event_pending() {
            return vec![
                "ERR an event is waiting to go out; commands only arrive in telemetry responses"
                    .to_string(),
            ];
        }

        let command = match parse_server_command(args) {
            Ok(command) => command,
            Err(error) => return vec![format!("ERR {error}")],
        };

        let id = command.id;
        self.planner.command(command);
        let mut lines = vec![format!("OK command {id} dispatched")];
        lines.extend(self.handle_step());
        lines
    }

    fn handle_gcode_done(&mut self, args: &[&str]) -> Vec<String> {
        if self.planner.background_command_id().is_none() {
            return vec!["ERR no background command is running".to_string()];
        }
        if self.planner.event_pending() {
            return vec!["ERR acknowledge the pending event first".to_string()];
        }

        let result = match args.first().copied() {
            Some("ok") => BackgroundResult::Success,
            Some("failed") => BackgroundResult::Failure,
            _ => return vec!["ERR gcode-done expects ok or failed".to_string()],
        };

        self.planner.background_done(result);
        let mut lines = vec!["OK background command finished".to_string()];
        lines.extend(self.handle_step());
        lines
    }

    fn handle_download(&mut self, args: &[&str]) -> Vec<String> {
        match args.first().copied() {
            Some("refuse") => {
                let refusal = match args.get(1).copied() {
                    Some("exists") => RigRefusal::Exists,
                    Some("request") => RigRefusal::Request,
                    Some("storage") => RigRefusal::Storage,
                    _ => {
                        return vec![
                            "ERR download refuse expects exists, request, or storage".to_string(),
                        ];
                    }
                };
                self.planner.transfers_mut().refuse_next = Some(refusal);
                vec![format!("OK next download start refused ({refusal:?})")]
            }
            Some(verb @ ("finish" | "stop" | "abort")) => {
                let outcome = match verb {
                    "finish" => TransferOutcome::Finished,
                    "stop" => TransferOutcome::Stopped,
                    _ => TransferOutcome::Error,
                };

                let Some(id) = self.planner.transfers_mut().finish(outcome) else {
                    return vec!["ERR no transfer is running".to_string()];
                };
                self.planner.download_done();
                self.planner.transfers_mut().release();
                vec![format!(
                    "OK transfer {id} ended ({outcome:?}); the planner reports it on the next step"
                )]
            }
            _ => vec!["ERR download expects finish, stop, abort, or refuse".to_string()],
        }
    }

    fn handle_printer(&mut self, args: &[&str]) -> Vec<String> {
        let printer = self.planner.printer_mut();
        match (args.first().copied(), args.get(1).copied()) {
            (Some("fingerprint"), Some(raw)) => {
                let Ok(value) = u64::from_str_radix(raw.trim_start_matches("0x"), 16) else {
                    return vec!["ERR fingerprint expects a hex value".to_string()];
                };
                printer.fingerprint = value;
                vec![format!("OK fingerprint={value:#x}")]
            }
            (Some("touch"), Some(path)) => {
                printer.touch(path);
                vec![format!("OK created {path}")]
            }
            (Some("printing"), Some(value @ ("on" | "off"))) => {
                printer.printing = value == "on";
                printer.paused = false;
                vec![format!("OK printing={value}")]
            }
            (Some("tls"), Some(value @ ("on" | "off"))) => {
                printer.config.tls = value == "on";
                printer.config_changed = true;
                vec![format!("OK tls={value} (config flagged as changed)")]
            }
            (Some("config-changed"), None) => {
                printer.config_changed = true;
                vec!["OK config flagged as changed".to_string()]
            }
            _ => vec!["ERR unknown printer knob (try `help printer`)".to_string()],
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let now = self.planner.clock().now_millis();
        for line in lines {
            self.transcript
                .append_line(now, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn describe_event(event: &Event) -> String {
    let mut rendered = event.kind.as_str().to_string();
    if let Some(id) = event.command_id {
        rendered.push_str(&format!(" cmd={id}"));
    }
    if let Some(job) = event.job_id {
        rendered.push_str(&format!(" job={job}"));
    }
    if let Some(path) = &event.path {
        rendered.push_str(&format!(" path={path}"));
    }
    if let Some(reason) = event.reason {
        rendered.push_str(&format!(" reason=\"{reason}\""));
    }
    if let Some(transfer) = event.transfer_id {
        rendered.push_str(&format!(" transfer={transfer}"));
    }
    if let Some(start_cmd) = event.start_cmd_id {
        rendered.push_str(&format!(" start-cmd={start_cmd}"));
    }
    if event.info_rescan_files {
        rendered.push_str(" rescan-files");
    }
    rendered
}

fn parse_server_command(args: &[&str]) -> Result<Command, String> {
    let id: CommandId = args
        .first()
        .and_then(|raw| raw.parse().ok())
        .ok_or("send expects a numeric command id first")?;

    let data = match args.get(1).copied() {
        Some("unknown") => CommandData::Unknown,
        Some("broken") => CommandData::Broken {
            reason: "Malformed command",
        },
        Some("gcode-too-large") => CommandData::GcodeTooLarge,
        Some("processing-other") => CommandData::ProcessingOtherCommand,
        Some("processing-this") => CommandData::ProcessingThisCommand,
        Some("gcode") => {
            let text = args[2..].join(" ");
            match GcodeBody::from_slice(text.as_bytes()) {
                Ok(body) => CommandData::Gcode { body },
                // The real parser downgrades oversized bodies the same way.
                Err(()) => CommandData::GcodeTooLarge,
            }
        }
        Some("pause") => CommandData::PausePrint,
        Some("resume") => CommandData::ResumePrint,
        Some("stop") => CommandData::StopPrint,
        Some("start-print") => CommandData::StartPrint {
            path: parse_path(args.get(2).copied())?,
        },
        Some("info") => CommandData::SendInfo,
        Some("job-info") => {
            let job_id = args
                .get(2)
                .and_then(|raw| raw.parse().ok())
                .ok_or("job-info expects a numeric job id")?;
            CommandData::SendJobInfo { job_id }
        }
        Some("file-info") => CommandData::SendFileInfo {
            path: parse_path(args.get(2).copied())?,
        },
        Some("transfer-info") => CommandData::SendTransferInfo,
        Some("ready") => CommandData::SetPrinterReady,
        Some("cancel-ready") => CommandData::CancelPrinterReady,
        Some("download") => {
            let team = args
                .get(2)
                .and_then(|raw| raw.parse().ok())
                .ok_or("download expects a numeric team id")?;
            let hash = args
                .get(3)
                .ok_or("download expects a file hash".to_string())
                .and_then(|raw| {
                    DownloadHash::try_from(*raw).map_err(|()| "download hash too long".to_string())
                })?;
            CommandData::StartConnectDownload {
                team,
                hash,
                path: parse_path(args.get(4).copied())?,
            }
        }
        // Anything else is exactly what the real parser would hand over for
        // an unrecognized server command.
        Some(_) => CommandData::Unknown,
        None => return Err("send expects a command name after the id".to_string()),
    };

    Ok(Command { id, data })
}

fn parse_path(raw: Option<&str>) -> Result<FilePath, String> {
    let raw = raw.ok_or("expected a file path argument")?;
    FilePath::try_from(raw).map_err(|()| format!("path `{raw}` is too long"))
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Printer connect emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds on the scripted planner clock"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, now: u32, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[+{:>6} ms] {} {}", now, role.prefix(), line)?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
