mod support;

use dashstash_core::status_led::BlinkPattern;
use dashstash_hal::{Operation, ProbeOps};
use dashstash_workflow::phase::LoopPhase;
use std::fs;
use support::{FakeKeepAwake, FakeTransport, Rig, TransportCall};

fn is_load(op: &Operation) -> bool {
    matches!(op, Operation::LoadModule { .. })
}

fn is_unload(op: &Operation) -> bool {
    matches!(op, Operation::UnloadModule { .. })
}

#[test]
fn reachable_at_boot_with_no_clips_attaches_and_waits_for_departure() {
    let rig = Rig::new(&[true]);
    let mut ctl = rig.control_loop();
    ctl.run(Some(0)).unwrap();

    assert_eq!(ctl.phase(), LoopPhase::AwaitingDeparture);
    assert!(rig.transport.archived().is_empty());
    assert_eq!(
        rig.transport.calls(),
        vec![
            TransportCall::Connect,
            TransportCall::Disconnect
        ]
    );
    assert!(rig.notifier.messages().is_empty());
    assert!(rig.hal.has_operation(is_load));
    assert!(rig.hal.gadget_luns().unwrap().iter().any(|l| l.backing_file.is_some()));
    assert!(rig.hal.mounted_paths().is_empty());
    assert_eq!(rig.hal.invariant_violations(), 0);
    assert_eq!(
        rig.indicator.shown(),
        vec![BlinkPattern::Fast, BlinkPattern::Double]
    );
}

#[test]
fn pending_clips_are_announced_once_and_archived() {
    let rig = Rig::new(&[true]);
    rig.add_events("TeslaCam/SavedClips", 3, 12);
    let mut ctl = rig.control_loop();
    ctl.run(Some(0)).unwrap();

    assert_eq!(
        rig.notifier.messages(),
        vec!["Archiving 3 event folder(s) with 12 file(s)".to_string()]
    );
    assert_eq!(rig.transport.archived(), vec!["TeslaCam/SavedClips".to_string()]);
    assert_eq!(rig.keep_awake.calls(), vec!["status", "enable", "disable"]);
    assert!(!*rig.keep_awake.enabled.lock().unwrap());

    let cam = rig.camera_mount();
    assert_eq!(
        rig.hal.count_operations(|op| matches!(op, Operation::Fstrim { mount_point } if *mount_point == cam)),
        1
    );
    assert_eq!(
        rig.hal.count_operations(|op| matches!(op, Operation::Unmount { target, .. } if *target == cam)),
        1
    );
    // Emptied event folders are removed, the clip folder itself stays.
    let saved = cam.join("TeslaCam/SavedClips");
    assert!(saved.is_dir());
    assert_eq!(fs::read_dir(&saved).unwrap().count(), 0);
    assert_eq!(rig.hal.invariant_violations(), 0);
}

#[test]
fn keep_awake_left_on_when_it_started_on() {
    let mut rig = Rig::new(&[true]);
    rig.keep_awake = std::sync::Arc::new(FakeKeepAwake::already_on());
    rig.add_events("TeslaCam/SentryClips", 1, 2);
    rig.control_loop().run(Some(0)).unwrap();

    assert_eq!(rig.keep_awake.calls(), vec!["status"]);
    assert!(*rig.keep_awake.enabled.lock().unwrap());
}

#[test]
fn failed_transfer_still_trims_and_unmounts() {
    let rig = Rig::with_transport(
        &[true],
        FakeTransport {
            fail_clips: true,
            ..FakeTransport::default()
        },
    );
    rig.add_events("TeslaCam/SavedClips", 1, 3);
    rig.control_loop().run(Some(0)).unwrap();

    let cam = rig.camera_mount();
    assert!(rig.hal.has_operation(|op| matches!(op, Operation::Fstrim { mount_point } if *mount_point == cam)));
    assert!(rig.hal.mounted_paths().is_empty());
    assert!(rig.hal.has_operation(is_load));
    assert_eq!(rig.keep_awake.calls(), vec!["status", "enable", "disable"]);
}

#[test]
fn mount_failure_skips_volume_but_still_attaches() {
    let rig = Rig::new(&[true]);
    rig.add_events("TeslaCam/SavedClips", 2, 4);
    let cam = rig.camera_mount();
    rig.hal.fail_mounts(&cam, u32::MAX);

    let mut ctl = rig.control_loop();
    ctl.run(Some(0)).unwrap();

    assert_eq!(
        rig.hal.count_operations(|op| matches!(op, Operation::Mount { target } if *target == cam)),
        10
    );
    assert!(rig.transport.archived().is_empty());
    assert!(rig.notifier.messages().is_empty());
    assert!(rig.hal.has_operation(is_load));
    assert_eq!(ctl.phase(), LoopPhase::AwaitingDeparture);
    assert_eq!(rig.hal.invariant_violations(), 0);
}

#[test]
fn refused_connection_skips_the_archive_cycle() {
    let rig = Rig::with_transport(
        &[true],
        FakeTransport {
            refuse_connect: true,
            ..FakeTransport::default()
        },
    );
    rig.add_events("TeslaCam/SavedClips", 1, 1);
    rig.control_loop().run(Some(0)).unwrap();

    assert_eq!(rig.transport.calls(), vec![TransportCall::Connect]);
    assert!(!rig.hal.has_operation(|op| matches!(op, Operation::Mount { .. })));
    assert!(rig.hal.has_operation(is_load));
}

#[test]
fn music_failure_does_not_affect_camera_cleanup() {
    let rig = Rig::with_music(
        &[true],
        FakeTransport {
            music_available: true,
            fail_music: true,
            ..FakeTransport::default()
        },
    );
    rig.add_events("TeslaCam/SavedClips", 1, 2);
    rig.control_loop().run(Some(0)).unwrap();

    let cam = rig.camera_mount();
    let music = rig.music_mount();
    assert!(rig.transport.calls().contains(&TransportCall::SyncMusic(music.clone())));
    for target in [&cam, &music] {
        assert_eq!(
            rig.hal.count_operations(|op| matches!(op, Operation::Fstrim { mount_point } if mount_point == target)),
            1
        );
    }
    assert!(rig.hal.mounted_paths().is_empty());
    // Both images are exposed to the host.
    let luns = rig.hal.gadget_luns().unwrap();
    assert_eq!(luns.len(), 2);
    assert_eq!(rig.hal.invariant_violations(), 0);
}

#[test]
fn unavailable_music_is_not_mounted() {
    let rig = Rig::with_music(&[true], FakeTransport::default());
    rig.control_loop().run(Some(0)).unwrap();

    let music = rig.music_mount();
    assert!(rig.transport.calls().contains(&TransportCall::MusicAvailable));
    assert!(!rig.hal.has_operation(|op| matches!(op, Operation::Mount { target } if *target == music)));
}

#[test]
fn unreachable_at_boot_attaches_directly() {
    let rig = Rig::new(&[false]);
    let mut ctl = rig.control_loop();
    let local = ctl.boot().unwrap();
    let _host = ctl.initial_branch(local);

    assert_eq!(ctl.phase(), LoopPhase::AwaitingArchive);
    assert!(rig.transport.calls().is_empty());
    assert!(rig.hal.has_operation(is_load));
    assert_eq!(rig.indicator.shown(), vec![BlinkPattern::Slow]);
    // Boot repairs the camera image before anything else touches it.
    let ops = rig.hal.operations();
    let first_fsck = ops.iter().position(|op| matches!(op, Operation::Fsck { .. }));
    let first_load = ops.iter().position(is_load);
    assert!(first_fsck.unwrap() < first_load.unwrap());
}

#[test]
fn steady_cycle_runs_in_order_and_truncates_log() {
    let rig = Rig::new(&[false, true]);
    let log: String = (0..15_000).map(|i| format!("line {i}\n")).collect();
    fs::write(&rig.cfg.log.path, log).unwrap();

    let mut ctl = rig.control_loop();
    ctl.run(Some(1)).unwrap();

    assert_eq!(ctl.cycles(), 1);
    assert_eq!(
        rig.indicator.shown(),
        vec![
            BlinkPattern::Slow,
            BlinkPattern::Slow,
            BlinkPattern::Fast,
            BlinkPattern::Double
        ]
    );
    // Boot snapshot plus the one before maintenance.
    assert_eq!(rig.snapshotter.calls(), 2);
    assert!(rig.hal.has_operation(|op| matches!(
        op,
        Operation::Command { program, .. } if program == "sntp"
    )));

    let ops = rig.hal.operations();
    let unload = ops.iter().rposition(is_unload).unwrap();
    let last_fsck = ops.iter().rposition(|op| matches!(op, Operation::Fsck { .. })).unwrap();
    let last_load = ops.iter().rposition(is_load).unwrap();
    assert!(unload < last_fsck && last_fsck < last_load);

    let content = fs::read_to_string(&rig.cfg.log.path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 10_000);
    assert_eq!(lines[0], "line 5000");
    assert_eq!(lines[9_999], "line 14999");
    assert_eq!(rig.hal.invariant_violations(), 0);
}

#[test]
fn stuck_gadget_heals_exactly_once() {
    let rig = Rig::new(&[false, true]);
    let mut ctl = rig.control_loop();
    let local = ctl.boot().unwrap();
    let host = ctl.initial_branch(local);

    rig.hal.clear();
    rig.hal.stick_gadget_loads(1);
    let _host = ctl.steady_cycle(host);

    assert_eq!(rig.hal.count_operations(is_unload), 2);
    assert_eq!(rig.hal.count_operations(is_load), 2);
    assert!(rig.hal.gadget_luns().unwrap().iter().any(|l| l.backing_file.is_some()));
    assert_eq!(rig.hal.invariant_violations(), 0);
}

#[test]
fn gadget_that_stays_stuck_is_not_retried_forever() {
    let rig = Rig::new(&[false, true]);
    let mut ctl = rig.control_loop();
    let local = ctl.boot().unwrap();
    let host = ctl.initial_branch(local);

    rig.hal.clear();
    rig.hal.stick_gadget_loads(5);
    let _host = ctl.steady_cycle(host);

    assert_eq!(rig.hal.count_operations(is_load), 2);
    assert_eq!(ctl.cycles(), 1);
}

#[test]
fn unreachable_marker_ends_departure_wait() {
    // The probe keeps answering "reachable"; only the marker ends the wait.
    let rig = Rig::new(&[true; 64]);
    fs::write(&rig.cfg.markers.unreachable, b"").unwrap();

    let mut ctl = rig.control_loop();
    ctl.run(Some(0)).unwrap();

    assert_eq!(ctl.phase(), LoopPhase::AwaitingDeparture);
    assert!(!rig.cfg.markers.unreachable.exists());
}

#[test]
fn reachable_marker_starts_maintenance() {
    let rig = Rig::new(&[false]);
    fs::write(&rig.cfg.markers.reachable, b"").unwrap();

    let mut ctl = rig.control_loop();
    ctl.run(Some(1)).unwrap();

    assert_eq!(ctl.cycles(), 1);
    assert!(!rig.cfg.markers.reachable.exists());
    assert!(rig.transport.calls().contains(&TransportCall::Connect));
}

#[test]
fn reachable_marker_ends_a_wait_already_in_progress() {
    let rig = Rig::new(&[false]);
    let marker = rig.cfg.markers.reachable.clone();
    let probe = std::sync::Arc::clone(&rig.probe);
    let writer = std::thread::spawn(move || {
        // Boot and the initial branch probe once; wait until the steady cycle is polling.
        while probe.calls() < 5 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        fs::write(&marker, b"").unwrap();
    });

    let mut ctl = rig.control_loop();
    ctl.run(Some(1)).unwrap();
    writer.join().unwrap();

    assert_eq!(ctl.cycles(), 1);
    assert!(rig.probe.calls() >= 5);
    assert!(!rig.cfg.markers.reachable.exists());
    assert!(rig.transport.calls().contains(&TransportCall::Connect));
}
