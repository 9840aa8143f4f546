//! CPU module - 2A03 (6502 variant) implementation
//!
//! [`Cpu::tick`] advances the processor by one cycle. When the previous
//! instruction's cycles are used up the next opcode is fetched, its operand
//! resolved and the instruction executed in full; the remaining cycles of
//! that instruction are then spent idling. Interrupts are sampled at the same
//! instruction boundary.

use std::fmt;

use log::debug;
use thiserror::Error;

use crate::bus::BusError;
use crate::config::IllegalOpcodePolicy;

/// NMI vector
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector
pub const IRQ_VECTOR: u16 = 0xFFFE;
/// Stack page
pub const STACK_BASE: u16 = 0x0100;

/// Cycles taken by reset and by interrupt entry
pub const INTERRUPT_CYCLES: u16 = 7;

/// Memory as seen by the CPU.
pub trait Bus {
    /// Read a byte, with whatever side effects the address has.
    fn read(&mut self, address: u16) -> Result<u8, BusError>;

    /// Write a byte.
    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError>;

    /// Read a byte without side effects, for tracing and debugging.
    fn peek(&self, address: u16) -> u8;
}

/// Faults that stop the CPU.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CpuError {
    #[error("illegal opcode ${opcode:02X} at ${pc:04X}")]
    IllegalOpcode { opcode: u8, pc: u16 },
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// CPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const INTERRUPT: u8 = 0b0000_0100;
    pub const DECIMAL: u8 = 0b0000_1000;
    pub const BREAK: u8 = 0b0001_0000;
    pub const UNUSED: u8 = 0b0010_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;

    /// U always reads back as 1; B only exists on the stack.
    pub fn new(flags: u8) -> Self {
        Self((flags | Self::UNUSED) & !Self::BREAK)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn carry(&self) -> bool {
        self.contains(Self::CARRY)
    }

    pub fn zero(&self) -> bool {
        self.contains(Self::ZERO)
    }

    pub fn interrupt(&self) -> bool {
        self.contains(Self::INTERRUPT)
    }

    pub fn decimal(&self) -> bool {
        self.contains(Self::DECIMAL)
    }

    pub fn overflow(&self) -> bool {
        self.contains(Self::OVERFLOW)
    }

    pub fn negative(&self) -> bool {
        self.contains(Self::NEGATIVE)
    }
}

impl fmt::Display for StatusFlags {
    /// `NV-BDIZC`, upper case when set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bit, name) in (0..8).rev().zip("NVUBDIZC".chars()) {
            let set = self.0 & (1 << bit) != 0;
            let c = if set { name } else { name.to_ascii_lowercase() };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: StatusFlags,
    /// Stack pointer into page 1
    pub sp: u8,
    pub pc: u16,
}

impl Default for CpuRegisters {
    /// Power-on values. The reset sequence then moves SP to $FD.
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: StatusFlags::new(StatusFlags::INTERRUPT),
            sp: 0x00,
            pc: 0,
        }
    }
}

/// Operand addressing modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
}

impl AddressingMode {
    /// Operand bytes following the opcode.
    pub const fn operand_len(self) -> u16 {
        match self {
            Self::Implied | Self::Accumulator => 0,
            Self::Absolute | Self::AbsoluteX | Self::AbsoluteY | Self::Indirect => 2,
            _ => 1,
        }
    }
}

/// Instruction mnemonics, official and unofficial.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
    // Stable unofficial opcodes
    LAX, SAX, DCP, ISB, SLO, RLA, SRE, RRA, ANC, ALR, ARR, AXS,
    /// JAM and the unstable store/transfer opcodes
    STP,
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry of the opcode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Base cycle count
    pub cycles: u8,
    /// One extra cycle when indexing crosses a page
    pub page_penalty: bool,
    pub official: bool,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_penalty: false, official: true }
}

const fn op_p(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_penalty: true, official: true }
}

const fn un(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_penalty: false, official: false }
}

const fn un_p(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_penalty: true, official: false }
}

/// Decode an opcode byte.
#[rustfmt::skip]
pub const fn decode(opcode: u8) -> Instruction {
    use AddressingMode::*;
    use Mnemonic::*;

    match opcode {
        0x69 => op(ADC, Immediate, 2), 0x65 => op(ADC, ZeroPage, 3), 0x75 => op(ADC, ZeroPageX, 4),
        0x6D => op(ADC, Absolute, 4), 0x7D => op_p(ADC, AbsoluteX, 4), 0x79 => op_p(ADC, AbsoluteY, 4),
        0x61 => op(ADC, IndirectX, 6), 0x71 => op_p(ADC, IndirectY, 5),

        0x29 => op(AND, Immediate, 2), 0x25 => op(AND, ZeroPage, 3), 0x35 => op(AND, ZeroPageX, 4),
        0x2D => op(AND, Absolute, 4), 0x3D => op_p(AND, AbsoluteX, 4), 0x39 => op_p(AND, AbsoluteY, 4),
        0x21 => op(AND, IndirectX, 6), 0x31 => op_p(AND, IndirectY, 5),

        0x0A => op(ASL, Accumulator, 2), 0x06 => op(ASL, ZeroPage, 5), 0x16 => op(ASL, ZeroPageX, 6),
        0x0E => op(ASL, Absolute, 6), 0x1E => op(ASL, AbsoluteX, 7),

        0x90 => op(BCC, Relative, 2), 0xB0 => op(BCS, Relative, 2), 0xF0 => op(BEQ, Relative, 2),
        0x30 => op(BMI, Relative, 2), 0xD0 => op(BNE, Relative, 2), 0x10 => op(BPL, Relative, 2),
        0x50 => op(BVC, Relative, 2), 0x70 => op(BVS, Relative, 2),

        0x24 => op(BIT, ZeroPage, 3), 0x2C => op(BIT, Absolute, 4),

        0x00 => op(BRK, Implied, 7),

        0x18 => op(CLC, Implied, 2), 0xD8 => op(CLD, Implied, 2), 0x58 => op(CLI, Implied, 2),
        0xB8 => op(CLV, Implied, 2),

        0xC9 => op(CMP, Immediate, 2), 0xC5 => op(CMP, ZeroPage, 3), 0xD5 => op(CMP, ZeroPageX, 4),
        0xCD => op(CMP, Absolute, 4), 0xDD => op_p(CMP, AbsoluteX, 4), 0xD9 => op_p(CMP, AbsoluteY, 4),
        0xC1 => op(CMP, IndirectX, 6), 0xD1 => op_p(CMP, IndirectY, 5),

        0xE0 => op(CPX, Immediate, 2), 0xE4 => op(CPX, ZeroPage, 3), 0xEC => op(CPX, Absolute, 4),
        0xC0 => op(CPY, Immediate, 2), 0xC4 => op(CPY, ZeroPage, 3), 0xCC => op(CPY, Absolute, 4),

        0xC6 => op(DEC, ZeroPage, 5), 0xD6 => op(DEC, ZeroPageX, 6), 0xCE => op(DEC, Absolute, 6),
        0xDE => op(DEC, AbsoluteX, 7),
        0xCA => op(DEX, Implied, 2), 0x88 => op(DEY, Implied, 2),

        0x49 => op(EOR, Immediate, 2), 0x45 => op(EOR, ZeroPage, 3), 0x55 => op(EOR, ZeroPageX, 4),
        0x4D => op(EOR, Absolute, 4), 0x5D => op_p(EOR, AbsoluteX, 4), 0x59 => op_p(EOR, AbsoluteY, 4),
        0x41 => op(EOR, IndirectX, 6), 0x51 => op_p(EOR, IndirectY, 5),

        0xE6 => op(INC, ZeroPage, 5), 0xF6 => op(INC, ZeroPageX, 6), 0xEE => op(INC, Absolute, 6),
        0xFE => op(INC, AbsoluteX, 7),
        0xE8 => op(INX, Implied, 2), 0xC8 => op(INY, Implied, 2),

        0x4C => op(JMP, Absolute, 3), 0x6C => op(JMP, Indirect, 5),
        0x20 => op(JSR, Absolute, 6),

        0xA9 => op(LDA, Immediate, 2), 0xA5 => op(LDA, ZeroPage, 3), 0xB5 => op(LDA, ZeroPageX, 4),
        0xAD => op(LDA, Absolute, 4), 0xBD => op_p(LDA, AbsoluteX, 4), 0xB9 => op_p(LDA, AbsoluteY, 4),
        0xA1 => op(LDA, IndirectX, 6), 0xB1 => op_p(LDA, IndirectY, 5),

        0xA2 => op(LDX, Immediate, 2), 0xA6 => op(LDX, ZeroPage, 3), 0xB6 => op(LDX, ZeroPageY, 4),
        0xAE => op(LDX, Absolute, 4), 0xBE => op_p(LDX, AbsoluteY, 4),

        0xA0 => op(LDY, Immediate, 2), 0xA4 => op(LDY, ZeroPage, 3), 0xB4 => op(LDY, ZeroPageX, 4),
        0xAC => op(LDY, Absolute, 4), 0xBC => op_p(LDY, AbsoluteX, 4),

        0x4A => op(LSR, Accumulator, 2), 0x46 => op(LSR, ZeroPage, 5), 0x56 => op(LSR, ZeroPageX, 6),
        0x4E => op(LSR, Absolute, 6), 0x5E => op(LSR, AbsoluteX, 7),

        0xEA => op(NOP, Implied, 2),

        0x09 => op(ORA, Immediate, 2), 0x05 => op(ORA, ZeroPage, 3), 0x15 => op(ORA, ZeroPageX, 4),
        0x0D => op(ORA, Absolute, 4), 0x1D => op_p(ORA, AbsoluteX, 4), 0x19 => op_p(ORA, AbsoluteY, 4),
        0x01 => op(ORA, IndirectX, 6), 0x11 => op_p(ORA, IndirectY, 5),

        0x48 => op(PHA, Implied, 3), 0x08 => op(PHP, Implied, 3),
        0x68 => op(PLA, Implied, 4), 0x28 => op(PLP, Implied, 4),

        0x2A => op(ROL, Accumulator, 2), 0x26 => op(ROL, ZeroPage, 5), 0x36 => op(ROL, ZeroPageX, 6),
        0x2E => op(ROL, Absolute, 6), 0x3E => op(ROL, AbsoluteX, 7),

        0x6A => op(ROR, Accumulator, 2), 0x66 => op(ROR, ZeroPage, 5), 0x76 => op(ROR, ZeroPageX, 6),
        0x6E => op(ROR, Absolute, 6), 0x7E => op(ROR, AbsoluteX, 7),

        0x40 => op(RTI, Implied, 6), 0x60 => op(RTS, Implied, 6),

        0xE9 => op(SBC, Immediate, 2), 0xE5 => op(SBC, ZeroPage, 3), 0xF5 => op(SBC, ZeroPageX, 4),
        0xED => op(SBC, Absolute, 4), 0xFD => op_p(SBC, AbsoluteX, 4), 0xF9 => op_p(SBC, AbsoluteY, 4),
        0xE1 => op(SBC, IndirectX, 6), 0xF1 => op_p(SBC, IndirectY, 5),

        0x38 => op(SEC, Implied, 2), 0xF8 => op(SED, Implied, 2), 0x78 => op(SEI, Implied, 2),

        0x85 => op(STA, ZeroPage, 3), 0x95 => op(STA, ZeroPageX, 4), 0x8D => op(STA, Absolute, 4),
        0x9D => op(STA, AbsoluteX, 5), 0x99 => op(STA, AbsoluteY, 5), 0x81 => op(STA, IndirectX, 6),
        0x91 => op(STA, IndirectY, 6),

        0x86 => op(STX, ZeroPage, 3), 0x96 => op(STX, ZeroPageY, 4), 0x8E => op(STX, Absolute, 4),
        0x84 => op(STY, ZeroPage, 3), 0x94 => op(STY, ZeroPageX, 4), 0x8C => op(STY, Absolute, 4),

        0xAA => op(TAX, Implied, 2), 0xA8 => op(TAY, Implied, 2), 0xBA => op(TSX, Implied, 2),
        0x8A => op(TXA, Implied, 2), 0x9A => op(TXS, Implied, 2), 0x98 => op(TYA, Implied, 2),

        // Unofficial NOPs
        0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => un(NOP, Implied, 2),
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => un(NOP, Immediate, 2),
        0x04 | 0x44 | 0x64 => un(NOP, ZeroPage, 3),
        0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => un(NOP, ZeroPageX, 4),
        0x0C => un(NOP, Absolute, 4),
        0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => un_p(NOP, AbsoluteX, 4),

        0xA7 => un(LAX, ZeroPage, 3), 0xB7 => un(LAX, ZeroPageY, 4), 0xAF => un(LAX, Absolute, 4),
        0xBF => un_p(LAX, AbsoluteY, 4), 0xA3 => un(LAX, IndirectX, 6), 0xB3 => un_p(LAX, IndirectY, 5),

        0x87 => un(SAX, ZeroPage, 3), 0x97 => un(SAX, ZeroPageY, 4), 0x8F => un(SAX, Absolute, 4),
        0x83 => un(SAX, IndirectX, 6),

        0xEB => un(SBC, Immediate, 2),

        0xC7 => un(DCP, ZeroPage, 5), 0xD7 => un(DCP, ZeroPageX, 6), 0xCF => un(DCP, Absolute, 6),
        0xDF => un(DCP, AbsoluteX, 7), 0xDB => un(DCP, AbsoluteY, 7), 0xC3 => un(DCP, IndirectX, 8),
        0xD3 => un(DCP, IndirectY, 8),

        0xE7 => un(ISB, ZeroPage, 5), 0xF7 => un(ISB, ZeroPageX, 6), 0xEF => un(ISB, Absolute, 6),
        0xFF => un(ISB, AbsoluteX, 7), 0xFB => un(ISB, AbsoluteY, 7), 0xE3 => un(ISB, IndirectX, 8),
        0xF3 => un(ISB, IndirectY, 8),

        0x07 => un(SLO, ZeroPage, 5), 0x17 => un(SLO, ZeroPageX, 6), 0x0F => un(SLO, Absolute, 6),
        0x1F => un(SLO, AbsoluteX, 7), 0x1B => un(SLO, AbsoluteY, 7), 0x03 => un(SLO, IndirectX, 8),
        0x13 => un(SLO, IndirectY, 8),

        0x27 => un(RLA, ZeroPage, 5), 0x37 => un(RLA, ZeroPageX, 6), 0x2F => un(RLA, Absolute, 6),
        0x3F => un(RLA, AbsoluteX, 7), 0x3B => un(RLA, AbsoluteY, 7), 0x23 => un(RLA, IndirectX, 8),
        0x33 => un(RLA, IndirectY, 8),

        0x47 => un(SRE, ZeroPage, 5), 0x57 => un(SRE, ZeroPageX, 6), 0x4F => un(SRE, Absolute, 6),
        0x5F => un(SRE, AbsoluteX, 7), 0x5B => un(SRE, AbsoluteY, 7), 0x43 => un(SRE, IndirectX, 8),
        0x53 => un(SRE, IndirectY, 8),

        0x67 => un(RRA, ZeroPage, 5), 0x77 => un(RRA, ZeroPageX, 6), 0x6F => un(RRA, Absolute, 6),
        0x7F => un(RRA, AbsoluteX, 7), 0x7B => un(RRA, AbsoluteY, 7), 0x63 => un(RRA, IndirectX, 8),
        0x73 => un(RRA, IndirectY, 8),

        0x0B | 0x2B => un(ANC, Immediate, 2),
        0x4B => un(ALR, Immediate, 2),
        0x6B => un(ARR, Immediate, 2),
        0xCB => un(AXS, Immediate, 2),

        // JAM, SHA, SHX, SHY, TAS, LAS, XAA, LXA
        _ => un(STP, Implied, 2),
    }
}

/// Resolved operand of the instruction being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Implied,
    Accumulator,
    Memory { address: u16, page_crossed: bool },
}

impl Operand {
    fn memory(address: u16) -> Self {
        Self::Memory { address, page_crossed: false }
    }

    fn indexed(base: u16, index: u8) -> Self {
        let address = base.wrapping_add(u16::from(index));
        Self::Memory {
            address,
            page_crossed: (base & 0xFF00) != (address & 0xFF00),
        }
    }

    fn page_crossed(&self) -> bool {
        matches!(self, Self::Memory { page_crossed: true, .. })
    }
}

/// The 2A03 CPU
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: CpuRegisters,
    /// Cycles left before the next instruction boundary
    remaining_cycles: u16,
    /// Cycles elapsed since power-on
    tick_counter: u64,
    nmi_pending: bool,
    irq_line: bool,
    illegal_opcodes: IllegalOpcodePolicy,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new(IllegalOpcodePolicy::default())
    }
}

impl Cpu {
    pub fn new(illegal_opcodes: IllegalOpcodePolicy) -> Self {
        Self {
            registers: CpuRegisters::default(),
            remaining_cycles: 0,
            tick_counter: 0,
            nmi_pending: false,
            irq_line: false,
            illegal_opcodes,
        }
    }

    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    pub fn status(&self) -> StatusFlags {
        self.registers.p
    }

    pub fn tick_counter(&self) -> u64 {
        self.tick_counter
    }

    pub fn remaining_cycles(&self) -> u16 {
        self.remaining_cycles
    }

    /// The next tick will fetch an opcode or service an interrupt.
    pub fn at_instruction_boundary(&self) -> bool {
        self.remaining_cycles == 0
    }

    /// Registers to power-on values, then the reset sequence.
    pub fn power_on<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        self.registers = CpuRegisters::default();
        self.tick_counter = 0;
        self.reset(bus)
    }

    /// Reset sequence: SP drops by 3 without writing, I is set, PC is loaded
    /// from $FFFC, and 7 cycles pass.
    pub fn reset<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        self.registers.sp = self.registers.sp.wrapping_sub(3);
        self.registers.p.set(StatusFlags::INTERRUPT, true);
        self.registers.pc = self.read_word(bus, RESET_VECTOR)?;
        self.remaining_cycles = INTERRUPT_CYCLES;
        self.nmi_pending = false;
        debug!("CPU reset, PC=${:04X}", self.registers.pc);
        Ok(())
    }

    /// Latch an NMI; serviced at the next instruction boundary.
    pub fn request_nmi(&mut self) {
        self.nmi_pending = true;
    }

    /// Drive the IRQ input. It is a level: sampled at each instruction
    /// boundary where I is clear, and ignored while I is set.
    pub fn set_irq_line(&mut self, asserted: bool) {
        self.irq_line = asserted;
    }

    pub fn irq_line(&self) -> bool {
        self.irq_line
    }

    /// Hold the CPU for `cycles` extra cycles (OAM DMA).
    pub fn stall(&mut self, cycles: u16) {
        self.remaining_cycles += cycles;
    }

    /// Advance one CPU cycle.
    pub fn tick<B: Bus>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        if self.remaining_cycles == 0 {
            self.remaining_cycles = if self.nmi_pending {
                self.nmi_pending = false;
                self.interrupt(bus, NMI_VECTOR, false)?
            } else if self.irq_line && !self.registers.p.interrupt() {
                self.interrupt(bus, IRQ_VECTOR, false)?
            } else {
                self.step(bus)?
            };
        }
        self.remaining_cycles -= 1;
        self.tick_counter += 1;
        Ok(())
    }

    /// Fetch, decode and execute one instruction; returns its cycle count.
    fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u16, CpuError> {
        let pc = self.registers.pc;
        let opcode = bus.read(pc)?;
        let instruction = decode(opcode);

        let halt = instruction.mnemonic == Mnemonic::STP
            || (!instruction.official && self.illegal_opcodes == IllegalOpcodePolicy::Halt);
        if halt {
            return Err(CpuError::IllegalOpcode { opcode, pc });
        }

        self.registers.pc = pc.wrapping_add(1);
        let operand = self.resolve(bus, instruction.mode)?;
        let extra = self.execute(bus, instruction.mnemonic, operand)?;

        let mut cycles = u16::from(instruction.cycles) + extra;
        if instruction.page_penalty && operand.page_crossed() {
            cycles += 1;
        }
        Ok(cycles)
    }

    // -----------------------------------------------------------------------
    // Memory helpers
    // -----------------------------------------------------------------------

    fn read_word<B: Bus>(&mut self, bus: &mut B, address: u16) -> Result<u16, CpuError> {
        let lo = bus.read(address)?;
        let hi = bus.read(address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Pointer read confined to one page (zero page and JMP indirect).
    fn read_word_in_page<B: Bus>(&mut self, bus: &mut B, address: u16) -> Result<u16, CpuError> {
        let lo = bus.read(address)?;
        let hi = bus.read((address & 0xFF00) | (address.wrapping_add(1) & 0x00FF))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn fetch_byte<B: Bus>(&mut self, bus: &mut B) -> Result<u8, CpuError> {
        let value = bus.read(self.registers.pc)?;
        self.registers.pc = self.registers.pc.wrapping_add(1);
        Ok(value)
    }

    fn fetch_word<B: Bus>(&mut self, bus: &mut B) -> Result<u16, CpuError> {
        let lo = self.fetch_byte(bus)?;
        let hi = self.fetch_byte(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn push<B: Bus>(&mut self, bus: &mut B, value: u8) -> Result<(), CpuError> {
        bus.write(STACK_BASE | u16::from(self.registers.sp), value)?;
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        Ok(())
    }

    fn pull<B: Bus>(&mut self, bus: &mut B) -> Result<u8, CpuError> {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        Ok(bus.read(STACK_BASE | u16::from(self.registers.sp))?)
    }

    fn push_word<B: Bus>(&mut self, bus: &mut B, value: u16) -> Result<(), CpuError> {
        let [lo, hi] = value.to_le_bytes();
        self.push(bus, hi)?;
        self.push(bus, lo)
    }

    fn pull_word<B: Bus>(&mut self, bus: &mut B) -> Result<u16, CpuError> {
        let lo = self.pull(bus)?;
        let hi = self.pull(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Push PC and P, set I, jump through `vector`.
    fn interrupt<B: Bus>(&mut self, bus: &mut B, vector: u16, brk: bool) -> Result<u16, CpuError> {
        self.push_word(bus, self.registers.pc)?;
        let mut p = self.registers.p.bits() | StatusFlags::UNUSED;
        if brk {
            p |= StatusFlags::BREAK;
        }
        self.push(bus, p)?;
        self.registers.p.set(StatusFlags::INTERRUPT, true);
        self.registers.pc = self.read_word(bus, vector)?;
        Ok(INTERRUPT_CYCLES)
    }

    // -----------------------------------------------------------------------
    // Addressing
    // -----------------------------------------------------------------------

    fn resolve<B: Bus>(&mut self, bus: &mut B, mode: AddressingMode) -> Result<Operand, CpuError> {
        let x = self.registers.x;
        let y = self.registers.y;
        Ok(match mode {
            AddressingMode::Implied => Operand::Implied,
            AddressingMode::Accumulator => Operand::Accumulator,
            AddressingMode::Immediate => {
                let address = self.registers.pc;
                self.registers.pc = address.wrapping_add(1);
                Operand::memory(address)
            }
            AddressingMode::ZeroPage => Operand::memory(u16::from(self.fetch_byte(bus)?)),
            AddressingMode::ZeroPageX => {
                Operand::memory(u16::from(self.fetch_byte(bus)?.wrapping_add(x)))
            }
            AddressingMode::ZeroPageY => {
                Operand::memory(u16::from(self.fetch_byte(bus)?.wrapping_add(y)))
            }
            AddressingMode::Relative => {
                let offset = self.fetch_byte(bus)? as i8;
                let base = self.registers.pc;
                let address = base.wrapping_add_signed(i16::from(offset));
                Operand::Memory {
                    address,
                    page_crossed: (base & 0xFF00) != (address & 0xFF00),
                }
            }
            AddressingMode::Absolute => Operand::memory(self.fetch_word(bus)?),
            AddressingMode::AbsoluteX => {
                let base = self.fetch_word(bus)?;
                Operand::indexed(base, x)
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch_word(bus)?;
                Operand::indexed(base, y)
            }
            AddressingMode::Indirect => {
                // The high byte is fetched without carrying into the page:
                // JMP ($10FF) reads $10FF and $1000.
                let pointer = self.fetch_word(bus)?;
                Operand::memory(self.read_word_in_page(bus, pointer)?)
            }
            AddressingMode::IndirectX => {
                let pointer = self.fetch_byte(bus)?.wrapping_add(x);
                Operand::memory(self.read_word_in_page(bus, u16::from(pointer))?)
            }
            AddressingMode::IndirectY => {
                let pointer = self.fetch_byte(bus)?;
                let base = self.read_word_in_page(bus, u16::from(pointer))?;
                Operand::indexed(base, y)
            }
        })
    }

    fn load<B: Bus>(&mut self, bus: &mut B, operand: Operand) -> Result<u8, CpuError> {
        match operand {
            Operand::Memory { address, .. } => Ok(bus.read(address)?),
            _ => Ok(self.registers.a),
        }
    }

    fn store<B: Bus>(&mut self, bus: &mut B, operand: Operand, value: u8) -> Result<(), CpuError> {
        match operand {
            Operand::Memory { address, .. } => Ok(bus.write(address, value)?),
            _ => {
                self.registers.a = value;
                Ok(())
            }
        }
    }

    fn address(operand: Operand) -> u16 {
        match operand {
            Operand::Memory { address, .. } => address,
            _ => 0,
        }
    }

    // -----------------------------------------------------------------------
    // ALU
    // -----------------------------------------------------------------------

    fn set_zn(&mut self, value: u8) {
        self.registers.p.set(StatusFlags::ZERO, value == 0);
        self.registers.p.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }

    /// Add with carry. Returns the extra cycle spent in decimal mode.
    fn adc(&mut self, value: u8) -> u16 {
        let a = u16::from(self.registers.a);
        let m = u16::from(value);
        let carry = u16::from(self.registers.p.carry());
        let binary = a + m + carry;

        if !self.registers.p.decimal() {
            self.registers.p.set(StatusFlags::CARRY, binary > 0xFF);
            self.registers
                .p
                .set(StatusFlags::OVERFLOW, (!(a ^ m) & (a ^ binary) & 0x80) != 0);
            self.registers.a = binary as u8;
            self.set_zn(self.registers.a);
            return 0;
        }

        // Zero comes from the binary sum; N and V from the sum after the
        // low-nibble adjustment, as on the NMOS 6502.
        let mut result = binary;
        if (a & 0x0F) + (m & 0x0F) + carry > 0x09 {
            result += 0x06;
        }
        self.registers.p.set(StatusFlags::ZERO, binary & 0xFF == 0);
        self.registers.p.set(StatusFlags::NEGATIVE, result & 0x80 != 0);
        self.registers
            .p
            .set(StatusFlags::OVERFLOW, (!(a ^ m) & (a ^ result) & 0x80) != 0);
        if result > 0x99 {
            result += 0x60;
        }
        self.registers.p.set(StatusFlags::CARRY, result > 0x99);
        self.registers.a = result as u8;
        1
    }

    /// Subtract with borrow. Returns the extra cycle spent in decimal mode.
    fn sbc(&mut self, value: u8) -> u16 {
        let a = i16::from(self.registers.a);
        let m = i16::from(value);
        let borrow = i16::from(!self.registers.p.carry());
        let binary = a - m - borrow;

        self.registers.p.set(StatusFlags::CARRY, binary >= 0);
        self.registers.p.set(
            StatusFlags::OVERFLOW,
            ((a ^ binary) & (a ^ m) & 0x80) != 0,
        );
        self.set_zn(binary as u8);

        if !self.registers.p.decimal() {
            self.registers.a = binary as u8;
            return 0;
        }

        let mut result = binary;
        if (a & 0x0F) - (m & 0x0F) - borrow < 0 {
            result -= 0x06;
        }
        if binary < 0 {
            result -= 0x60;
        }
        self.registers.a = result as u8;
        1
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.registers.p.set(StatusFlags::CARRY, register >= value);
        self.set_zn(register.wrapping_sub(value));
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.registers.p.set(StatusFlags::CARRY, value & 0x80 != 0);
        let result = value << 1;
        self.set_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.registers.p.set(StatusFlags::CARRY, value & 0x01 != 0);
        let result = value >> 1;
        self.set_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.registers.p.carry());
        self.registers.p.set(StatusFlags::CARRY, value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.set_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.registers.p.carry()) << 7;
        self.registers.p.set(StatusFlags::CARRY, value & 0x01 != 0);
        let result = (value >> 1) | carry_in;
        self.set_zn(result);
        result
    }

    /// Read-modify-write through `f`; returns the written value.
    fn modify<B: Bus>(
        &mut self,
        bus: &mut B,
        operand: Operand,
        f: fn(&mut Self, u8) -> u8,
    ) -> Result<u8, CpuError> {
        let value = self.load(bus, operand)?;
        let result = f(self, value);
        self.store(bus, operand, result)?;
        Ok(result)
    }

    fn branch(&mut self, condition: bool, operand: Operand) -> u16 {
        match operand {
            Operand::Memory { address, page_crossed } if condition => {
                self.registers.pc = address;
                1 + u16::from(page_crossed)
            }
            _ => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute `mnemonic`; returns cycles beyond the table's base count
    /// (branches taken, decimal arithmetic).
    fn execute<B: Bus>(
        &mut self,
        bus: &mut B,
        mnemonic: Mnemonic,
        operand: Operand,
    ) -> Result<u16, CpuError> {
        use Mnemonic::*;

        let p = self.registers.p;
        let mut extra = 0;
        match mnemonic {
            // Loads, stores, transfers
            LDA => {
                self.registers.a = self.load(bus, operand)?;
                self.set_zn(self.registers.a);
            }
            LDX => {
                self.registers.x = self.load(bus, operand)?;
                self.set_zn(self.registers.x);
            }
            LDY => {
                self.registers.y = self.load(bus, operand)?;
                self.set_zn(self.registers.y);
            }
            STA => self.store(bus, operand, self.registers.a)?,
            STX => self.store(bus, operand, self.registers.x)?,
            STY => self.store(bus, operand, self.registers.y)?,
            TAX => {
                self.registers.x = self.registers.a;
                self.set_zn(self.registers.x);
            }
            TAY => {
                self.registers.y = self.registers.a;
                self.set_zn(self.registers.y);
            }
            TSX => {
                self.registers.x = self.registers.sp;
                self.set_zn(self.registers.x);
            }
            TXA => {
                self.registers.a = self.registers.x;
                self.set_zn(self.registers.a);
            }
            TXS => self.registers.sp = self.registers.x,
            TYA => {
                self.registers.a = self.registers.y;
                self.set_zn(self.registers.a);
            }

            // Stack
            PHA => self.push(bus, self.registers.a)?,
            PHP => self.push(bus, p.bits() | StatusFlags::BREAK | StatusFlags::UNUSED)?,
            PLA => {
                self.registers.a = self.pull(bus)?;
                self.set_zn(self.registers.a);
            }
            PLP => {
                let value = self.pull(bus)?;
                self.registers.p = StatusFlags::new(value);
            }

            // Logic and arithmetic
            AND => {
                self.registers.a &= self.load(bus, operand)?;
                self.set_zn(self.registers.a);
            }
            ORA => {
                self.registers.a |= self.load(bus, operand)?;
                self.set_zn(self.registers.a);
            }
            EOR => {
                self.registers.a ^= self.load(bus, operand)?;
                self.set_zn(self.registers.a);
            }
            ADC => {
                let value = self.load(bus, operand)?;
                extra += self.adc(value);
            }
            SBC => {
                let value = self.load(bus, operand)?;
                extra += self.sbc(value);
            }
            CMP => {
                let value = self.load(bus, operand)?;
                self.compare(self.registers.a, value);
            }
            CPX => {
                let value = self.load(bus, operand)?;
                self.compare(self.registers.x, value);
            }
            CPY => {
                let value = self.load(bus, operand)?;
                self.compare(self.registers.y, value);
            }
            BIT => {
                let value = self.load(bus, operand)?;
                self.registers
                    .p
                    .set(StatusFlags::ZERO, self.registers.a & value == 0);
                self.registers.p.set(StatusFlags::OVERFLOW, value & 0x40 != 0);
                self.registers.p.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
            }

            // Increments, decrements, shifts
            INC => {
                self.modify(bus, operand, |cpu, v| {
                    let r = v.wrapping_add(1);
                    cpu.set_zn(r);
                    r
                })?;
            }
            DEC => {
                self.modify(bus, operand, |cpu, v| {
                    let r = v.wrapping_sub(1);
                    cpu.set_zn(r);
                    r
                })?;
            }
            INX => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.set_zn(self.registers.x);
            }
            INY => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.set_zn(self.registers.y);
            }
            DEX => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.set_zn(self.registers.x);
            }
            DEY => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.set_zn(self.registers.y);
            }
            ASL => {
                self.modify(bus, operand, Self::asl)?;
            }
            LSR => {
                self.modify(bus, operand, Self::lsr)?;
            }
            ROL => {
                self.modify(bus, operand, Self::rol)?;
            }
            ROR => {
                self.modify(bus, operand, Self::ror)?;
            }

            // Flags
            CLC => self.registers.p.set(StatusFlags::CARRY, false),
            CLD => self.registers.p.set(StatusFlags::DECIMAL, false),
            CLI => self.registers.p.set(StatusFlags::INTERRUPT, false),
            CLV => self.registers.p.set(StatusFlags::OVERFLOW, false),
            SEC => self.registers.p.set(StatusFlags::CARRY, true),
            SED => self.registers.p.set(StatusFlags::DECIMAL, true),
            SEI => self.registers.p.set(StatusFlags::INTERRUPT, true),

            // Control flow
            BCC => extra += self.branch(!p.carry(), operand),
            BCS => extra += self.branch(p.carry(), operand),
            BEQ => extra += self.branch(p.zero(), operand),
            BNE => extra += self.branch(!p.zero(), operand),
            BMI => extra += self.branch(p.negative(), operand),
            BPL => extra += self.branch(!p.negative(), operand),
            BVC => extra += self.branch(!p.overflow(), operand),
            BVS => extra += self.branch(p.overflow(), operand),
            JMP => self.registers.pc = Self::address(operand),
            JSR => {
                self.push_word(bus, self.registers.pc.wrapping_sub(1))?;
                self.registers.pc = Self::address(operand);
            }
            RTS => self.registers.pc = self.pull_word(bus)?.wrapping_add(1),
            RTI => {
                let value = self.pull(bus)?;
                self.registers.p = StatusFlags::new(value);
                self.registers.pc = self.pull_word(bus)?;
            }
            BRK => {
                // The byte after BRK is padding and is skipped on return.
                self.registers.pc = self.registers.pc.wrapping_add(1);
                self.interrupt(bus, IRQ_VECTOR, true)?;
            }
            NOP => {
                if let Operand::Memory { address, .. } = operand {
                    bus.read(address)?;
                }
            }

            // Unofficial
            LAX => {
                let value = self.load(bus, operand)?;
                self.registers.a = value;
                self.registers.x = value;
                self.set_zn(value);
            }
            SAX => self.store(bus, operand, self.registers.a & self.registers.x)?,
            DCP => {
                let value = self.modify(bus, operand, |_, v| v.wrapping_sub(1))?;
                self.compare(self.registers.a, value);
            }
            ISB => {
                let value = self.modify(bus, operand, |_, v| v.wrapping_add(1))?;
                extra += self.sbc(value);
            }
            SLO => {
                let value = self.modify(bus, operand, Self::asl)?;
                self.registers.a |= value;
                self.set_zn(self.registers.a);
            }
            RLA => {
                let value = self.modify(bus, operand, Self::rol)?;
                self.registers.a &= value;
                self.set_zn(self.registers.a);
            }
            SRE => {
                let value = self.modify(bus, operand, Self::lsr)?;
                self.registers.a ^= value;
                self.set_zn(self.registers.a);
            }
            RRA => {
                let value = self.modify(bus, operand, Self::ror)?;
                extra += self.adc(value);
            }
            ANC => {
                self.registers.a &= self.load(bus, operand)?;
                self.set_zn(self.registers.a);
                self.registers
                    .p
                    .set(StatusFlags::CARRY, self.registers.a & 0x80 != 0);
            }
            ALR => {
                self.registers.a &= self.load(bus, operand)?;
                self.registers.a = self.lsr(self.registers.a);
            }
            ARR => {
                self.registers.a &= self.load(bus, operand)?;
                let carry_in = u8::from(p.carry()) << 7;
                let result = (self.registers.a >> 1) | carry_in;
                self.registers.a = result;
                self.set_zn(result);
                self.registers.p.set(StatusFlags::CARRY, result & 0x40 != 0);
                self.registers.p.set(
                    StatusFlags::OVERFLOW,
                    ((result >> 6) ^ (result >> 5)) & 0x01 != 0,
                );
            }
            AXS => {
                let value = self.load(bus, operand)?;
                let ax = self.registers.a & self.registers.x;
                self.registers.p.set(StatusFlags::CARRY, ax >= value);
                self.registers.x = ax.wrapping_sub(value);
                self.set_zn(self.registers.x);
            }
            // Rejected in step()
            STP => {}
        }
        Ok(extra)
    }
}
