//! Instruction trace lines in the nestest.log layout
//!
//! ```text
//! C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7
//! ```
//!
//! Memory operands are shown with their current contents, read through
//! [`Bus::peek`] so tracing never disturbs the machine.

use std::fmt::Write;

use crate::cpu::{decode, AddressingMode, Bus, Cpu, Mnemonic};

/// Format the instruction at the CPU's PC. Meaningful at an instruction
/// boundary.
pub fn trace_line<B: Bus>(cpu: &Cpu, bus: &B, scanline: u16, dot: u16) -> String {
    let registers = cpu.registers();
    let pc = registers.pc;
    let opcode = bus.peek(pc);
    let instruction = decode(opcode);

    let len = 1 + instruction.mode.operand_len();
    let mut bytes = String::new();
    for i in 0..len {
        if i > 0 {
            bytes.push(' ');
        }
        let _ = write!(bytes, "{:02X}", bus.peek(pc.wrapping_add(i)));
    }

    let marker = if instruction.official { ' ' } else { '*' };
    let disassembly = disassemble(cpu, bus, pc);

    format!(
        "{pc:04X}  {bytes:<8} {marker}{disassembly:<32}A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{scanline:>3},{dot:>3} CYC:{}",
        registers.a,
        registers.x,
        registers.y,
        registers.p.bits(),
        registers.sp,
        cpu.tick_counter(),
    )
}

/// Disassemble the instruction at `pc`, resolving operands against the
/// current register values.
pub fn disassemble<B: Bus>(cpu: &Cpu, bus: &B, pc: u16) -> String {
    let registers = cpu.registers();
    let instruction = decode(bus.peek(pc));
    let mnemonic = instruction.mnemonic;
    let lo = bus.peek(pc.wrapping_add(1));
    let hi = bus.peek(pc.wrapping_add(2));
    let word = u16::from_le_bytes([lo, hi]);
    let zp_word = |pointer: u8| {
        u16::from_le_bytes([
            bus.peek(u16::from(pointer)),
            bus.peek(u16::from(pointer.wrapping_add(1))),
        ])
    };

    match instruction.mode {
        AddressingMode::Implied => mnemonic.to_string(),
        AddressingMode::Accumulator => format!("{mnemonic} A"),
        AddressingMode::Immediate => format!("{mnemonic} #${lo:02X}"),
        AddressingMode::ZeroPage => {
            format!("{mnemonic} ${lo:02X} = {:02X}", bus.peek(u16::from(lo)))
        }
        AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
            let (name, index) = if instruction.mode == AddressingMode::ZeroPageX {
                ('X', registers.x)
            } else {
                ('Y', registers.y)
            };
            let address = lo.wrapping_add(index);
            format!(
                "{mnemonic} ${lo:02X},{name} @ {address:02X} = {:02X}",
                bus.peek(u16::from(address))
            )
        }
        AddressingMode::Relative => {
            let target = pc.wrapping_add(2).wrapping_add_signed(i16::from(lo as i8));
            format!("{mnemonic} ${target:04X}")
        }
        AddressingMode::Absolute => match mnemonic {
            Mnemonic::JMP | Mnemonic::JSR => format!("{mnemonic} ${word:04X}"),
            _ => format!("{mnemonic} ${word:04X} = {:02X}", bus.peek(word)),
        },
        AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
            let (name, index) = if instruction.mode == AddressingMode::AbsoluteX {
                ('X', registers.x)
            } else {
                ('Y', registers.y)
            };
            let address = word.wrapping_add(u16::from(index));
            format!(
                "{mnemonic} ${word:04X},{name} @ {address:04X} = {:02X}",
                bus.peek(address)
            )
        }
        AddressingMode::Indirect => {
            let target = u16::from_le_bytes([
                bus.peek(word),
                bus.peek((word & 0xFF00) | (word.wrapping_add(1) & 0x00FF)),
            ]);
            format!("{mnemonic} (${word:04X}) = {target:04X}")
        }
        AddressingMode::IndirectX => {
            let pointer = lo.wrapping_add(registers.x);
            let address = zp_word(pointer);
            format!(
                "{mnemonic} (${lo:02X},X) @ {pointer:02X} = {address:04X} = {:02X}",
                bus.peek(address)
            )
        }
        AddressingMode::IndirectY => {
            let base = zp_word(lo);
            let address = base.wrapping_add(u16::from(registers.y));
            format!(
                "{mnemonic} (${lo:02X}),Y = {base:04X} @ {address:04X} = {:02X}",
                bus.peek(address)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusError;

    struct Rom(Vec<u8>);

    impl Bus for Rom {
        fn read(&mut self, address: u16) -> Result<u8, BusError> {
            Ok(self.0[usize::from(address)])
        }

        fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
            self.0[usize::from(address)] = value;
            Ok(())
        }

        fn peek(&self, address: u16) -> u8 {
            self.0[usize::from(address)]
        }
    }

    fn rom_at_c000(program: &[u8]) -> (Cpu, Rom) {
        let mut memory = vec![0; 0x10000];
        memory[0xC000..0xC000 + program.len()].copy_from_slice(program);
        memory[0xFFFC] = 0x00;
        memory[0xFFFD] = 0xC0;
        let mut rom = Rom(memory);
        let mut cpu = Cpu::default();
        cpu.power_on(&mut rom).unwrap();
        while !cpu.at_instruction_boundary() {
            cpu.tick(&mut rom).unwrap();
        }
        (cpu, rom)
    }

    #[test]
    fn test_first_nestest_line() {
        let (cpu, rom) = rom_at_c000(&[0x4C, 0xF5, 0xC5]);
        assert_eq!(
            trace_line(&cpu, &rom, 0, 21),
            "C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7"
        );
    }

    #[test]
    fn test_operand_formats() {
        let (cpu, mut rom) = rom_at_c000(&[0xB1, 0x89]);
        rom.0[0x89] = 0x00;
        rom.0[0x8A] = 0x03;
        rom.0[0x0300] = 0x89;
        assert_eq!(disassemble(&cpu, &rom, 0xC000), "LDA ($89),Y = 0300 @ 0300 = 89");

        rom.0[0xC000] = 0x6C;
        rom.0[0xC001] = 0xFF;
        rom.0[0xC002] = 0x02;
        rom.0[0x02FF] = 0x80;
        rom.0[0x0200] = 0x12;
        assert_eq!(disassemble(&cpu, &rom, 0xC000), "JMP ($02FF) = 1280");
    }

    #[test]
    fn test_unofficial_marker() {
        let (cpu, rom) = rom_at_c000(&[0x04, 0xA9]);
        let line = trace_line(&cpu, &rom, 0, 0);
        assert!(line.starts_with("C000  04 A9    *NOP $A9 = 00"));
    }
}
