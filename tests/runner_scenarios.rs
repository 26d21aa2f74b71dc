//! Whole runs from the main console and back

mod common;

use common::*;
use fwdump_core::{
    AppConfig, ByteOrder, DumpOutcome, InstrumentError, ModuleOutcome, ModuleSettings, OutputSettings, ResponseRule,
    RomImage, Runner, TimingSettings, Transcript, TransportTrait, VirtualInstrument,
};
use std::fs;
use std::path::Path;

fn config(root: &Path, slots: Vec<u8>, roms: Vec<RomImage>) -> AppConfig {
    AppConfig {
        timing: TimingSettings::immediate(),
        output: OutputSettings {
            root: root.to_path_buf(),
            ..OutputSettings::default()
        },
        modules: ModuleSettings { slots },
        roms,
        ..AppConfig::default()
    }
}

fn module_dir(root: &Path) -> std::path::PathBuf {
    fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.file_name().unwrap().to_string_lossy().starts_with("MODULES-"))
        .expect("module directory")
}

#[test]
fn full_run_dumps_modules_and_roms() {
    let dir = tempfile::tempdir().unwrap();
    let acq = pattern(0x40);
    let exp = pattern(0x20);
    let module = sample_module(b"SD-24   B020023 ");

    let mut device = full_instrument();
    add_module_listing(&mut device, module_listing(&module));
    add_module_listing(&mut device, module_listing(&blank_module()));
    add_rom_stream(&mut device, rm_lines(0x8000, &acq, ByteOrder::Big));
    add_rom_stream(&mut device, rm_lines(0x1000, &exp, ByteOrder::Little));

    let roms = vec![
        RomImage {
            byte_order: ByteOrder::Big,
            ..RomImage::new('d', 0x8000, 0x40, &["ACQM2", "ACQM1"], &["ACQ_{version}.bin"])
        },
        RomImage::new('a', 0x1000, 0x20, &["EXP"], &["EXP_LO_{version}.bin", "EXP_HI_{version}.bin"]),
    ];
    let mut runner = Runner::with_transcript(device, config(dir.path(), vec![1, 3], roms), Transcript::new());
    let summary = runner.run().unwrap();

    assert!(summary.is_complete());
    assert_eq!(summary.modules.len(), 2);
    assert_eq!(summary.modules[1], (3, ModuleOutcome::Empty));
    assert_eq!(
        summary.roms,
        vec![
            ("mem-d-00008000.bin".to_string(), DumpOutcome::Complete { bytes: 0x40 }),
            ("mem-a-00001000.bin".to_string(), DumpOutcome::Complete { bytes: 0x20 }),
        ]
    );

    let session = runner.session().unwrap();
    assert_eq!(session.name, "SD-24 v1.0-B012345");
    assert_eq!(session.main_baud, Some(9600));
    assert_eq!(session.test_baud, Some(38400));

    let rom_dir = dir.path().join("SD-24-v1-0-B012345");
    assert_eq!(fs::read(rom_dir.join("ACQ_2-3.bin")).unwrap(), acq);
    let lo = fs::read(rom_dir.join("EXP_LO_1-1.bin")).unwrap();
    let hi = fs::read(rom_dir.join("EXP_HI_1-1.bin")).unwrap();
    assert_eq!(lo.len() + hi.len(), exp.len());
    assert_eq!(lo[0], exp[0]);
    assert_eq!(hi[0], exp[1]);

    let modules = module_dir(dir.path());
    assert_eq!(
        fs::read(modules.join("SD-24-B020023.bin")).unwrap(),
        module.as_bytes().to_vec()
    );
    assert_eq!(fs::read_dir(&modules).unwrap().count(), 1);

    let matcher = runner.into_matcher();
    let device = matcher.transport();
    let keys = device.keystrokes();
    assert!(keys.contains("TEST MAN\n"));
    assert!(keys.contains("B38400\nTTWWWWWO"));
    assert!(keys.ends_with("XEE"));
    assert_eq!(device.state(), "console");
    assert_eq!(device.listening_baud(), Some(38400));

    let stats = device.stats();
    assert_eq!(stats.bytes_sent, keys.len() as u64);
    assert!(stats.bytes_received > 0x60);
    assert!(stats.baud_changes >= 1);
    assert!(device.connection_info().starts_with("virtual:main console"));
}

#[test]
fn already_fast_link_skips_switch() {
    let dir = tempfile::tempdir().unwrap();

    let mut device = full_instrument();
    device.listen_at(38400);
    device.set_state("warm");
    // Instrument still in test mode from an earlier run answers only after the exit
    device.add_rule(
        ResponseRule::reply("recover", "XEE", b"")
            .with_priority(10)
            .in_state("warm")
            .goto("console")
            .then_listen_at(9600),
    );
    device.add_rule(
        ResponseRule::reply("fast test", "TEST MAN\n", b"")
            .with_priority(10)
            .in_state("console")
            .goto("warm")
            .then_listen_at(38400),
    );

    let mut runner = Runner::with_transcript(device, config(dir.path(), vec![], vec![]), Transcript::new());
    let summary = runner.run().unwrap();

    assert_eq!(summary, Default::default());
    assert_eq!(runner.session().unwrap().test_baud, Some(38400));

    let matcher = runner.into_matcher();
    let keys = matcher.transport().keystrokes();
    assert!(!keys.contains("B38400"));
    assert!(keys.contains("WWWWWO"));
}

#[test]
fn silent_line_fails_to_connect() {
    let dir = tempfile::tempdir().unwrap();
    let device = VirtualInstrument::new("silent");

    let mut runner = Runner::with_transcript(device, config(dir.path(), vec![1], vec![]), Transcript::new());
    let err = runner.run().unwrap_err();

    assert!(matches!(err, InstrumentError::ConnectionFailure { attempts: 2 }));
    let matcher = runner.into_matcher();
    let keys = matcher.transport().keystrokes();
    // Two recovery rounds, each sending the exit at both test rates
    assert_eq!(keys.matches("XEE").count(), 4);
    assert_eq!(keys.matches("ID?\n").count(), 3);
}
