use std::io;

#[allow(dead_code)]
#[path = "../rig.rs"]
mod rig;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::Session;

fn main() -> io::Result<()> {
    record("cold_start", COLD_START)?;
    record("telemetry_cadence", TELEMETRY_CADENCE)?;
    record("backoff", BACKOFF)?;
    record("print_commands", PRINT_COMMANDS)?;
    record("gcode_background", GCODE_BACKGROUND)?;
    record("download", DOWNLOAD)?;
    Ok(())
}

fn record(name: &str, script: &[&str]) -> io::Result<()> {
    let mut session = Session::new(format!("transcripts/{name}.txt"))?;
    for line in script {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

const COLD_START: &[&str] = &[
    "status",
    "step",
    "done ok",
    "step",
    "done ok",
    "status",
];

const TELEMETRY_CADENCE: &[&str] = &[
    "step",
    "done ok",
    "step",
    "done ok",
    "step",
    "step",
    "done ok",
    "printer printing on",
    "step",
    "step",
    "done ok",
];

const BACKOFF: &[&str] = &[
    "step",
    "done ok",
    "step",
    "done failed",
    "step",
    "step",
    "done failed",
    "step",
    "step",
    "done failed",
    "step",
    "step",
    "done ok",
];

const PRINT_COMMANDS: &[&str] = &[
    "step",
    "done ok",
    "step",
    "done ok",
    "printer touch /usb/model.gcode",
    "send 1 start-print /usb/model.gcode",
    "done ok",
    "step",
    "done ok",
    "send 2 start-print /etc/passwd",
    "done ok",
    "step",
    "done ok",
    "send 3 pause",
    "done ok",
    "step",
    "done ok",
    "send 4 resume",
    "done ok",
    "step",
    "done ok",
    "send 5 stop",
    "done ok",
    "status",
];

const GCODE_BACKGROUND: &[&str] = &[
    "step",
    "done ok",
    "step",
    "done ok",
    "send 6 gcode G28 G1 X10 G1 Y10",
    "done ok",
    "step",
    "done ok",
    "step",
    "send 6 processing-this",
    "done ok",
    "step",
    "done ok",
    "step",
    "gcode-done ok",
    "done ok",
    "status",
];

const DOWNLOAD: &[&str] = &[
    "step",
    "done ok",
    "step",
    "done ok",
    "send 7 download 42 c0ffee /usb/big.gcode",
    "done ok",
    "step",
    "done ok",
    "step",
    "download finish",
    "step",
    "done ok",
    "send 8 transfer-info",
    "done ok",
    "status",
];
