//! Action election: Info changes, telemetry cadence, and sleep handouts.

use connect_core::command::CommandData;
use connect_core::event::EventKind;
use connect_core::planner::{
    ActionResult, TELEMETRY_INTERVAL_LONG, TELEMETRY_INTERVAL_SHORT,
};

use crate::support::{
    Next, download_hash, expect_event, expect_sleep, expect_telemetry, file_path, gcode_body, next,
    planner, send, settle,
};

#[test]
fn cold_start_emits_info_with_file_rescan() {
    let mut planner = planner();
    planner.reset();
    planner.printer_mut().fingerprint = 0xA;
    planner.printer_mut().files = 0xB;

    let event = expect_event(&mut planner);
    assert_eq!(event.kind, EventKind::Info);
    assert!(event.info_rescan_files);
    assert_eq!(event.command_id, None);
}

#[test]
fn acknowledged_info_forces_immediate_telemetry() {
    let mut planner = planner();

    let info = expect_event(&mut planner);
    assert_eq!(info.kind, EventKind::Info);
    planner.action_done(ActionResult::Ok);

    assert!(!expect_telemetry(&mut planner));
}

#[test]
fn telemetry_cadence_follows_the_long_interval() {
    let mut planner = planner();
    settle(&mut planner);

    planner.clock_mut().advance(TELEMETRY_INTERVAL_LONG - 1);
    assert_eq!(expect_sleep(&mut planner).duration, 1);

    planner.clock_mut().advance(1);
    assert!(!expect_telemetry(&mut planner));
}

#[test]
fn telemetry_threshold_scan() {
    let cases = [(false, TELEMETRY_INTERVAL_LONG), (true, TELEMETRY_INTERVAL_SHORT)];

    for (printing, interval) in cases {
        for elapsed in [0, 1, interval / 2, interval - 1] {
            let mut planner = planner();
            settle(&mut planner);
            planner.printer_mut().printing = printing;
            planner.clock_mut().advance(elapsed);
            assert_eq!(
                expect_sleep(&mut planner).duration,
                interval - elapsed,
                "printing={printing} elapsed={elapsed}"
            );
        }

        for elapsed in [interval, interval + 1, interval * 2] {
            let mut planner = planner();
            settle(&mut planner);
            planner.printer_mut().printing = printing;
            planner.clock_mut().advance(elapsed);
            assert!(
                !expect_telemetry(&mut planner),
                "printing={printing} elapsed={elapsed}"
            );
        }
    }
}

#[test]
fn background_command_shortens_the_telemetry_interval() {
    let mut planner = planner();
    settle(&mut planner);

    send(&mut planner, 3, CommandData::Gcode { body: gcode_body("G28\n") });
    assert_eq!(expect_event(&mut planner).kind, EventKind::Accepted);
    planner.action_done(ActionResult::Ok);
    assert!(!expect_telemetry(&mut planner));
    planner.action_done(ActionResult::Ok);

    let sleep = expect_sleep(&mut planner);
    assert_eq!(sleep.duration, TELEMETRY_INTERVAL_SHORT);
    assert_eq!(sleep.background, Some(3));
}

#[test]
fn fingerprint_change_elects_info_without_rescan() {
    let mut planner = planner();
    settle(&mut planner);

    planner.printer_mut().fingerprint = 0x5;
    let event = expect_event(&mut planner);
    assert_eq!(event.kind, EventKind::Info);
    assert!(!event.info_rescan_files);
}

#[test]
fn files_change_elects_info_with_rescan() {
    let mut planner = planner();
    settle(&mut planner);

    planner.printer_mut().files = 0x5;
    let event = expect_event(&mut planner);
    assert_eq!(event.kind, EventKind::Info);
    assert!(event.info_rescan_files);
}

#[test]
fn unchanged_hashes_elect_no_info() {
    let mut planner = planner();
    settle(&mut planner);

    assert!(matches!(next(&mut planner), Next::Sleep(_)));
}

#[test]
fn pending_event_repeats_until_acknowledged() {
    let mut planner = planner();
    settle(&mut planner);

    send(&mut planner, 12, CommandData::SendJobInfo { job_id: 5 });
    let first = expect_event(&mut planner);
    let second = expect_event(&mut planner);
    assert_eq!(first, second);

    planner.action_done(ActionResult::Ok);
    assert!(!expect_telemetry(&mut planner));
}

#[test]
fn cooldown_sleep_withholds_background_but_hands_out_download() {
    let mut planner = planner();
    settle(&mut planner);
    planner.printer_mut().touch("/usb/model.gcode");

    send(
        &mut planner,
        42,
        CommandData::StartConnectDownload {
            team: 7,
            hash: download_hash("abc123"),
            path: file_path("/usb/model.gcode"),
        },
    );
    assert_eq!(expect_event(&mut planner).kind, EventKind::Finished);
    planner.action_done(ActionResult::Ok);
    assert!(!expect_telemetry(&mut planner));
    planner.action_done(ActionResult::Ok);

    send(&mut planner, 3, CommandData::Gcode { body: gcode_body("G28\n") });
    assert_eq!(expect_event(&mut planner).kind, EventKind::Accepted);
    planner.action_done(ActionResult::Failed);

    // The failed send leaves the Accepted event queued; the cooldown sleep
    // must withhold the background command but still hand out the download.
    let sleep = expect_sleep(&mut planner);
    assert_eq!(sleep.background, None);
    assert!(sleep.download.is_some());

    assert_eq!(expect_event(&mut planner).kind, EventKind::Accepted);
    planner.action_done(ActionResult::Ok);
    assert!(!expect_telemetry(&mut planner));
    planner.action_done(ActionResult::Ok);

    let idle = expect_sleep(&mut planner);
    assert_eq!(idle.background, Some(3));
    assert!(idle.download.is_some());
}
