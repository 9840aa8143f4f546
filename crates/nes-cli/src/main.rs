//! NES CLI - Headless runner for the NES core
//!
//! Runs a ROM for a number of frames without a window. Optionally prints a
//! nestest-style trace of the first instructions and dumps CPU/PPU state at
//! the end. Set `RUST_LOG=debug` for mapper and DMA activity.

use clap::Parser;
use log::info;
use nes_core::config::{IllegalOpcodePolicy, NesConfig};
use nes_core::system::NesSystem;
use std::fs;
use std::path::PathBuf;

/// NES Emulator CLI
#[derive(Parser, Debug)]
#[command(name = "nes-cli")]
#[command(about = "Run an iNES ROM headless", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value = "60")]
    frames: u64,

    /// Dump CPU state after execution
    #[arg(short = 'c', long)]
    dump_cpu: bool,

    /// Dump PPU state after execution
    #[arg(short = 'p', long)]
    dump_ppu: bool,

    /// Print a trace line for each of the first N instructions
    #[arg(short, long, value_name = "N")]
    trace: Option<u64>,

    /// Start execution here instead of at the reset vector (hex, e.g. C000)
    #[arg(short, long, value_parser = parse_hex_address)]
    entry_point: Option<u16>,

    /// Execute the stable unofficial opcodes instead of halting on them
    #[arg(long)]
    illegal_opcodes: bool,
}

fn parse_hex_address(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches('$').trim_start_matches("0x");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    // Load ROM file
    let rom_data = match fs::read(&args.rom) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read ROM file: {}", e);
            std::process::exit(1);
        }
    };

    let config = NesConfig {
        entry_point: args.entry_point,
        illegal_opcodes: if args.illegal_opcodes {
            IllegalOpcodePolicy::Execute
        } else {
            IllegalOpcodePolicy::Halt
        },
        ..NesConfig::default()
    };

    let mut system = match NesSystem::from_ines(&rom_data, config) {
        Ok(system) => system,
        Err(e) => {
            eprintln!("Failed to load cartridge: {}", e);
            std::process::exit(1);
        }
    };

    let cartridge = system.cartridge();
    println!("Loaded cartridge:");
    println!("  PRG ROM: {} bytes", cartridge.prg_rom().len());
    println!("  CHR:     {} bytes", cartridge.chr().len());
    println!("  Mapper:  {:03}", cartridge.mapper_id());
    println!("  Mirroring: {:?}", cartridge.mirroring());

    if let Some(count) = args.trace {
        if let Err(e) = trace(&mut system, count) {
            eprintln!("Emulation stopped: {}", e);
            dump(&system, &args);
            std::process::exit(1);
        }
    }

    println!("\nRunning {} frames...", args.frames);
    for _ in 0..args.frames {
        if let Err(e) = system.run_frame() {
            eprintln!("Emulation stopped: {}", e);
            dump(&system, &args);
            std::process::exit(1);
        }
    }
    info!("{} CPU cycles executed", system.cpu().tick_counter());

    println!("Completed {} frames.", system.frame_count());
    dump(&system, &args);
}

/// Print one trace line per instruction for `count` instructions.
fn trace(system: &mut NesSystem, count: u64) -> Result<(), nes_core::NesError> {
    while !system.cpu().at_instruction_boundary() {
        system.tick()?;
    }
    for _ in 0..count {
        println!("{}", system.trace());
        system.step_instruction()?;
    }
    Ok(())
}

fn dump(system: &NesSystem, args: &Args) {
    if args.dump_cpu {
        dump_cpu_state(system);
    }
    if args.dump_ppu {
        dump_ppu_state(system);
    }
}

fn dump_cpu_state(system: &NesSystem) {
    let cpu = system.cpu();
    let regs = cpu.registers();

    println!("\nCPU State:");
    println!("  A:    ${:02X}", regs.a);
    println!("  X:    ${:02X}", regs.x);
    println!("  Y:    ${:02X}", regs.y);
    println!("  PC:   ${:04X}", regs.pc);
    println!("  SP:   ${:02X}", regs.sp);
    println!("  P:    ${:02X} ({})", regs.p.bits(), regs.p);
    println!("  Cycles: {}", cpu.tick_counter());
}

fn dump_ppu_state(system: &NesSystem) {
    let ppu = system.ppu();

    println!("\nPPU State:");
    println!("  Scanline: {}", ppu.scanline());
    println!("  Dot:      {}", ppu.dot());
    println!("  State:    {:?}", ppu.state());
    println!("  CTRL:     ${:02X}", ppu.control().bits());
    println!("  MASK:     ${:02X}", ppu.mask().bits());
    println!("  STATUS:   ${:02X}", ppu.status().bits());
    println!("  v/t/x/w:  ${:04X} ${:04X} {} {}", ppu.v(), ppu.t(), ppu.fine_x(), ppu.write_toggle());
    println!("  Frames:   {}", ppu.frame_count());
}
