//! Scripted instrument used by the integration tests.
//!
//! The menu tree is modelled with state-gated rules; each state is named
//! after the screen the instrument shows.

#![allow(dead_code)]

use fwdump_core::core::codec::IMAGE_LEN;
use fwdump_core::{ByteOrder, Matcher, ModuleImage, Navigator, Pacing, ResponseRule, Transcript, VirtualInstrument};
use std::time::Duration;

pub const IDENTITY: &str = "SD-24,v1.0,ACQM1/2.3,EXP/1.1";
pub const UID: &str = "MAIN:\"B012345\",ACQ:\"B020023\"";

pub fn navigator() -> Navigator {
    Navigator::new(Pacing::immediate(Duration::from_millis(50)))
}

pub fn matcher(device: VirtualInstrument) -> Matcher<VirtualInstrument> {
    Matcher::new(device, Transcript::new()).with_default_timeout(Duration::from_millis(50))
}

fn rule(state: &str, input: &str, response: &str, next: &str) -> ResponseRule {
    ResponseRule::reply(&format!("{}:{:?}", state, input), input, response.as_bytes())
        .in_state(state)
        .goto(next)
}

/// Instrument sitting on the extended diagnostics screen
pub fn menu_instrument() -> VirtualInstrument {
    let mut device = VirtualInstrument::new("menu");
    add_menu_rules(&mut device);
    device.set_state("diag");
    device
}

/// Instrument on the main console, able to enter test mode
pub fn full_instrument() -> VirtualInstrument {
    let mut device = VirtualInstrument::main_console(IDENTITY, Some(UID));
    add_menu_rules(&mut device);

    for r in [
        rule("console", "TEST MAN\n", "", "warm"),
        rule(
            "warm",
            "T",
            "\r\nSUBSYSTEM SELFTEST\r\n\x1b[H EXTENDED DIAGNOSTICS \x1b[2K",
            "diag",
        ),
        rule("diag", "B38400\n", "", "diag").then_listen_at(38400),
        rule("diag", "TT", "\x1b[H EXTENDED DIAGNOSTICS", "diag"),
        rule(
            "diag",
            "WWWWWO",
            "\x1b[0;4;7m Debugger \x1b[0m enabled \x1b[2K",
            "diag",
        ),
        rule("diag", "XEE", "", "console"),
    ] {
        device.add_rule(r);
    }
    device.set_state("console");
    device
}

fn add_menu_rules(device: &mut VirtualInstrument) {
    let rules = [
        // Hardware debugger
        rule("diag", "1", "", "diag1"),
        ResponseRule::pattern("diag1:subsystem", "^[a-d]$", b"")
            .in_state("diag1")
            .goto("diagk"),
        rule(
            "diagk",
            "D",
            "\x1b[2J Low-Level Hardware Debugger \r\n Access 8/16  16 \x1b[2K",
            "debugger",
        ),
        rule("debugger", "x", " Access 16 \x1b[2K", "debugger"),
        rule("debugger", "X", "", "diag"),
        // Module tree
        rule("diag", "q", "", "stopped"),
        rule("stopped", "1", "", "stopped1"),
        rule("stopped1", "d", " Main Acq \x1b[2K", "mainacq"),
        rule("stopped1", "T", "", "stopped1t"),
        rule("stopped1t", "T", "\x1b[H EXTENDED DIAGNOSTICS", "diag"),
        rule("mainacq", "2", "\x1b[2K", "acqsel"),
        rule("acqsel", "a", " Acq 1 \x1b[2K", "acq"),
        rule("acqsel", "b", " Acq 2 \x1b[2K", "acq"),
        rule("acq", "3", "\x1b[2K", "exsel"),
        rule("exsel", "g", " Exercisers \x1b[2K", "exer"),
        rule("exer", "4", "\x1b[2K", "regsel"),
        rule("regsel", "e", " Registers \x1b[2K", "regs"),
        rule("regs", "r", "Select function \x1b[2K", "select"),
        rule("select", "2", " Enter function \x1b[2K", "enter"),
        rule("select", "X", " Stopped \x1b[2K", "stopped"),
        rule("enter", "\r", "Enter head number \x1b[2K", "head"),
        ResponseRule::pattern("head:digit", "^[12]$", b" Enter ready \x1b[2K")
            .in_state("head")
            .goto("ready"),
        rule("listed", "\r", "Select function \x1b[2K", "select"),
    ];
    for r in rules {
        device.add_rule(r);
    }
}

/// Queue the continuous read output of the next `T` in the debugger
pub fn add_rom_stream(device: &mut VirtualInstrument, stream: Vec<u8>) {
    device.add_rule(
        ResponseRule::once("debugger:T", "T", &stream)
            .in_state("debugger")
            .goto("debugger"),
    );
}

/// Queue the listing printed for the next slot read
pub fn add_module_listing(device: &mut VirtualInstrument, listing: Vec<u8>) {
    device.add_rule(
        ResponseRule::once("ready:listing", "\r", &listing)
            .in_state("ready")
            .goto("listed"),
    );
}

/// `RM` lines displaying `data` from `start`, eight words per line
pub fn rm_lines(start: u32, data: &[u8], order: ByteOrder) -> Vec<u8> {
    let mut out = String::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        out.push_str(&rm_line(start + 16 * i as u32, chunk, order));
    }
    out.into_bytes()
}

/// One `RM` line
pub fn rm_line(address: u32, data: &[u8], order: ByteOrder) -> String {
    let mut line = format!("RM {:08X}", address);
    for pair in data.chunks_exact(2) {
        let word = match order {
            ByteOrder::Big => u16::from_be_bytes([pair[0], pair[1]]),
            ByteOrder::Little => u16::from_le_bytes([pair[0], pair[1]]),
        };
        line.push_str(&format!(" {:04X}", word));
    }
    line.push_str(" \x1b[K\r\n");
    line
}

/// Register exerciser listing of `image`, followed by the continue prompt
pub fn module_listing(image: &ModuleImage) -> Vec<u8> {
    let mut out = words_text(&image.words());
    out.push_str("Select ENTER to continue \x1b[2K");
    out.into_bytes()
}

pub fn words_text(words: &[u16]) -> String {
    words
        .chunks(8)
        .map(|row| {
            let mut line: String = row.iter().map(|w| format!("{:04X} ", w)).collect();
            line.push_str("\r\n");
            line
        })
        .collect()
}

/// A populated module with a valid checksum
pub fn sample_module(label: &[u8; 16]) -> ModuleImage {
    let mut bytes = [0u8; IMAGE_LEN];
    for (i, b) in bytes.iter_mut().enumerate().take(0x6e) {
        *b = (i * 3) as u8;
    }
    bytes[0x6e..0x7e].copy_from_slice(label);
    let mut image = ModuleImage::from_bytes(&bytes).unwrap();
    image.update_checksum();
    image
}

pub fn blank_module() -> ModuleImage {
    ModuleImage::from_bytes(&[0xff; IMAGE_LEN]).unwrap()
}

/// Deterministic test pattern
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 256) as u8).collect()
}
