//! Compare CPU execution with nestest.log
//!
//! Needs `tests/roms/nestest.nes` and `tests/roms/nestest.log`, which are not
//! shipped with the crate. Run with `cargo test --test compare_nestest -- --ignored`.

use std::fs;
use std::path::PathBuf;

use nes_core::config::{IllegalOpcodePolicy, NesConfig};
use nes_core::system::NesSystem;

/// One line of nestest.log:
/// `C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7`
#[derive(Debug, PartialEq, Eq)]
struct LogEntry {
    pc: u16,
    opcodes: Vec<u8>,
    instruction: String,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
    ppu_line: u16,
    ppu_dot: u16,
    cycles: u64,
}

fn parse_log_line(line: &str) -> Option<LogEntry> {
    let line = line.trim_end();
    let pc = u16::from_str_radix(line.get(0..4)?, 16).ok()?;

    let opcodes = line
        .get(6..14)?
        .split_whitespace()
        .map(|s| u8::from_str_radix(s, 16).ok())
        .collect::<Option<Vec<_>>>()?;

    let registers_start = line.find("A:")?;
    let instruction = line.get(15..registers_start)?.trim().to_string();
    let registers = line.get(registers_start..)?;

    let ppu = registers.get(registers.find("PPU:")? + 4..)?;
    let (ppu_line, rest) = ppu.split_once(',')?;
    let (ppu_dot, _) = rest.trim_start().split_once(' ')?;
    let cycles = registers.get(registers.find("CYC:")? + 4..)?;

    Some(LogEntry {
        pc,
        opcodes,
        instruction,
        a: parse_hex(registers, "A:")?,
        x: parse_hex(registers, "X:")?,
        y: parse_hex(registers, "Y:")?,
        p: parse_hex(registers, "P:")?,
        sp: parse_hex(registers, "SP:")?,
        ppu_line: ppu_line.trim().parse().ok()?,
        ppu_dot: ppu_dot.trim().parse().ok()?,
        cycles: cycles.trim().parse().ok()?,
    })
}

fn parse_hex(s: &str, prefix: &str) -> Option<u8> {
    let start = s.find(prefix)? + prefix.len();
    u8::from_str_radix(s.get(start..start + 2)?, 16).ok()
}

fn rom_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("roms")
}

#[test]
fn test_log_line_parsing() {
    let entry = parse_log_line(
        "C72A  D0 E0     BNE $C70C                       A:00 X:00 Y:00 P:26 SP:FB PPU: 66,228 CYC:7522",
    )
    .unwrap();
    assert_eq!(entry.pc, 0xC72A);
    assert_eq!(entry.opcodes, vec![0xD0, 0xE0]);
    assert_eq!(entry.instruction, "BNE $C70C");
    assert_eq!(entry.p, 0x26);
    assert_eq!(entry.sp, 0xFB);
    assert_eq!(entry.ppu_line, 66);
    assert_eq!(entry.ppu_dot, 228);
    assert_eq!(entry.cycles, 7522);

    let unofficial = parse_log_line(
        "C6BD  04 A9    *NOP $A9 = 00                    A:AA X:97 Y:4E P:EF SP:F5 PPU: 77, 89 CYC:8756",
    )
    .unwrap();
    assert_eq!(unofficial.instruction, "*NOP $A9 = 00");
}

#[test]
#[ignore = "needs tests/roms/nestest.nes and nestest.log"]
fn test_compare_with_nestest_log() {
    let dir = rom_dir();
    let (Ok(rom), Ok(log)) = (
        fs::read(dir.join("nestest.nes")),
        fs::read_to_string(dir.join("nestest.log")),
    ) else {
        eprintln!("nestest files not found in {}, skipping", dir.display());
        return;
    };

    let expected: Vec<LogEntry> = log.lines().filter_map(parse_log_line).collect();
    assert!(!expected.is_empty(), "no entries parsed from nestest.log");

    // Automation mode: start at $C000 instead of the reset vector, and run
    // the unofficial opcodes the second half of the test exercises.
    let config = NesConfig {
        entry_point: Some(0xC000),
        illegal_opcodes: IllegalOpcodePolicy::Execute,
        ..NesConfig::default()
    };
    let mut system = NesSystem::from_ines(&rom, config).unwrap();
    while !system.cpu().at_instruction_boundary() {
        system.tick().unwrap();
    }

    for (index, want) in expected.iter().enumerate() {
        let line = system.trace();
        let got = parse_log_line(&line)
            .unwrap_or_else(|| panic!("unparseable trace line {index}: {line}"));
        assert_eq!(got, *want, "line {}:\n  got  {line}", index + 1);

        if let Err(err) = system.step_instruction() {
            panic!("line {}: {err}", index + 1);
        }
    }

    // nestest reports failures in $02/$03
    assert_eq!(system.peek(0x0002), 0x00, "official opcode failure code");
    assert_eq!(system.peek(0x0003), 0x00, "unofficial opcode failure code");
}
