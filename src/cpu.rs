use std::fmt;

use crate::memory::Memory;
use crate::metrics::{record_instruction, record_unknown_opcode};
use crate::opcodes::{decode, OpcodeEntry, Operation};

// Status register flags
pub const CARRY_FLAG: u8 = 0x01;
pub const ZERO_FLAG: u8 = 0x02;
pub const INTERRUPT_DISABLE: u8 = 0x04;
pub const DECIMAL_MODE: u8 = 0x08;
pub const BREAK_COMMAND: u8 = 0x10;
pub const UNUSED_FLAG: u8 = 0x20;
pub const OVERFLOW_FLAG: u8 = 0x40;
pub const NEGATIVE_FLAG: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implicit,
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
    IndexedIndirect,
    IndirectIndexed,
}

/// Clock-cycle budget for one `execute` call.
///
/// Every bus primitive ticks the meter by the cycles that microoperation
/// costs on real hardware. An addressing resolver that detects a page
/// crossing grants one extra cycle immediately before ticking, so the net
/// effect is one extra cycle consumed. The remaining budget is signed: the
/// final instruction may overspend it, which is expected and never an error.
#[derive(Debug)]
pub struct CycleMeter {
    remaining: i64,
    spent: u64,
}

impl CycleMeter {
    pub fn new(budget: u32) -> Self {
        CycleMeter {
            remaining: budget as i64,
            spent: 0,
        }
    }

    /// Spend one clock cycle.
    pub fn tick(&mut self) {
        self.remaining -= 1;
        self.spent += 1;
    }

    /// Extend the budget by exactly one cycle, e.g. when a page boundary
    /// crossing makes an instruction one cycle longer than its base cost.
    pub fn grant_extra(&mut self) {
        self.remaining += 1;
    }

    pub fn running(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }

    /// Total cycles consumed so far, page-crossing penalties included.
    pub fn spent(&self) -> u64 {
        self.spent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    /// The fetched byte is not a mapped instruction. `address` is where the
    /// byte was fetched from (PC before the fetch).
    UnknownOpcode { opcode: u8, address: u16 },
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::UnknownOpcode { opcode, address } => {
                write!(f, "unknown opcode ${:02X} at address ${:04X}", opcode, address)
            }
        }
    }
}

impl std::error::Error for CpuError {}

/// What one `execute` call actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    pub cycles_spent: u64,
    pub instructions_retired: u64,
}

#[derive(Debug)]
pub struct Cpu {
    // Registers (public for snapshot support)
    pub pc: u16,    // Program Counter
    pub sp: u8,     // Stack Pointer, offset into page 0x0100
    pub a: u8,      // Accumulator
    pub x: u8,      // X Index Register
    pub y: u8,      // Y Index Register
    pub status: u8, // Status Register
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            pc: 0,
            sp: 0,
            a: 0,
            x: 0,
            y: 0,
            status: 0,
        }
    }

    /// Power-on reset. Parks PC at 0xFFFC and zero-fills memory.
    ///
    /// Real hardware reads the two bytes stored at 0xFFFC/0xFFFD and jumps
    /// there; this engine starts executing at 0xFFFC itself.
    pub fn reset(&mut self, memory: &mut Memory) {
        self.pc = 0xFFFC;
        self.sp = 0xFF;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.status = 0;

        memory.initialize();
    }

    // Flag operations

    pub fn flag_set(&self, flag: u8) -> bool {
        (self.status & flag) != 0
    }

    pub fn set_flag(&mut self, flag: u8) {
        self.status |= flag;
    }

    pub fn clear_flag(&mut self, flag: u8) {
        self.status &= !flag;
    }

    pub fn toggle_flag(&mut self, flag: u8) {
        self.status ^= flag;
    }

    // Set-only: raises Zero when the value is zero and Negative when bit 7
    // is set, and never clears either. A raised flag stays raised until an
    // operation that rewrites it runs (PLP rewrites the whole byte).
    fn set_zero_and_negative_flags(&mut self, value: u8) {
        if value == 0 {
            self.set_flag(ZERO_FLAG);
        }
        if value & 0x80 != 0 {
            self.set_flag(NEGATIVE_FLAG);
        }
    }

    // Bus primitives. These are the only operations that touch memory, and
    // every one of them bills the meter.

    /// Read the byte at PC and advance PC. 1 cycle.
    pub fn fetch_byte(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        let data = memory.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        meter.tick();
        data
    }

    /// Read the little-endian word at PC and advance PC by 2. 2 cycles.
    pub fn fetch_word(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u16 {
        let low = self.fetch_byte(meter, memory) as u16;
        let high = self.fetch_byte(meter, memory) as u16;
        (high << 8) | low
    }

    /// Read a byte without moving PC. 1 cycle.
    pub fn read_byte(&mut self, meter: &mut CycleMeter, memory: &Memory, address: u16) -> u8 {
        let data = memory.read(address);
        meter.tick();
        data
    }

    /// Read a little-endian word without moving PC. 2 cycles.
    pub fn read_word(&mut self, meter: &mut CycleMeter, memory: &Memory, address: u16) -> u16 {
        let low = self.read_byte(meter, memory, address) as u16;
        let high = self.read_byte(meter, memory, address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Write a byte. 1 cycle.
    pub fn write_byte(
        &mut self,
        meter: &mut CycleMeter,
        memory: &mut Memory,
        address: u16,
        value: u8,
    ) {
        memory.write(address, value);
        meter.tick();
    }

    /// Write to 0x0100+SP, then decrement SP (8-bit wraparound). 2 cycles.
    pub fn push_stack(&mut self, meter: &mut CycleMeter, memory: &mut Memory, value: u8) {
        let address = 0x0100 + self.sp as u16;
        self.write_byte(meter, memory, address, value);
        self.sp = self.sp.wrapping_sub(1);
        meter.tick();
    }

    /// Increment SP (8-bit wraparound), then read 0x0100+SP. 2 cycles.
    pub fn pop_stack(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        let address = 0x0100 + self.sp as u16;
        let data = self.read_byte(meter, memory, address);
        meter.tick();
        data
    }

    // Addressing mode resolvers. Each consumes its operand bytes via the
    // bus primitives and returns the effective address.

    pub fn zero_page_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        self.fetch_byte(meter, memory)
    }

    pub fn zero_page_x_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        let address = self.fetch_byte(meter, memory).wrapping_add(self.x);
        meter.tick();
        address
    }

    pub fn zero_page_y_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        let address = self.fetch_byte(meter, memory).wrapping_add(self.y);
        meter.tick();
        address
    }

    pub fn absolute_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u16 {
        self.fetch_word(meter, memory)
    }

    /// `variable_cycles` distinguishes instructions whose documented cycle
    /// count varies with page crossing (loads) from those with a fixed
    /// count (stores); the latter are always billed one extra cycle.
    pub fn absolute_x_address(
        &mut self,
        meter: &mut CycleMeter,
        memory: &Memory,
        variable_cycles: bool,
    ) -> u16 {
        let base = self.fetch_word(meter, memory);
        let address = base.wrapping_add(self.x as u16);
        self.charge_page_crossing(meter, base, address);
        if !variable_cycles {
            meter.tick();
        }
        address
    }

    pub fn absolute_y_address(
        &mut self,
        meter: &mut CycleMeter,
        memory: &Memory,
        variable_cycles: bool,
    ) -> u16 {
        let base = self.fetch_word(meter, memory);
        let address = base.wrapping_add(self.y as u16);
        self.charge_page_crossing(meter, base, address);
        if !variable_cycles {
            meter.tick();
        }
        address
    }

    /// The absolute operand is a pointer; the target is the word it points at.
    pub fn indirect_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u16 {
        let pointer = self.absolute_address(meter, memory);
        self.read_word(meter, memory, pointer)
    }

    /// Operand byte + X, wrapped within page zero, used as a pointer there.
    pub fn indexed_indirect_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u16 {
        let pointer = self.fetch_byte(meter, memory).wrapping_add(self.x);
        meter.tick();
        self.read_word(meter, memory, pointer as u16)
    }

    /// Operand byte is a zero-page pointer; Y is added to the word it holds.
    pub fn indirect_indexed_address(
        &mut self,
        meter: &mut CycleMeter,
        memory: &Memory,
        variable_cycles: bool,
    ) -> u16 {
        let pointer = self.fetch_byte(meter, memory);
        let base = self.read_word(meter, memory, pointer as u16);
        let address = base.wrapping_add(self.y as u16);
        self.charge_page_crossing(meter, base, address);
        if !variable_cycles {
            meter.tick();
        }
        address
    }

    /// Operand byte reinterpreted as a signed offset from the advanced PC.
    /// Only the fetch-time cycle is modeled; branch-taken penalties belong
    /// to the branch operation family.
    pub fn relative_address(&mut self, meter: &mut CycleMeter, memory: &Memory) -> u16 {
        let offset = self.fetch_byte(meter, memory) as i8;
        let address = self.pc.wrapping_add(offset as u16);
        meter.tick();
        address
    }

    // Crossing is detected against the high byte of the pre-index address.
    fn charge_page_crossing(&mut self, meter: &mut CycleMeter, base: u16, indexed: u16) {
        if (indexed & 0xFF00) != (base & 0xFF00) {
            meter.grant_extra();
            meter.tick();
        }
    }

    /// Run instructions until the cycle budget is exhausted.
    ///
    /// The budget may be overspent by the final instruction; registers and
    /// memory persist, so callers can resume by calling `execute` again.
    pub fn execute(
        &mut self,
        budget: u32,
        memory: &mut Memory,
    ) -> Result<ExecutionReport, CpuError> {
        let mut meter = CycleMeter::new(budget);
        let mut instructions_retired = 0u64;

        while meter.running() {
            let fetch_address = self.pc;
            let opcode = self.fetch_byte(&mut meter, memory);

            let entry = match decode(opcode) {
                Some(entry) => entry,
                None => {
                    record_unknown_opcode();
                    return Err(CpuError::UnknownOpcode {
                        opcode,
                        address: fetch_address,
                    });
                }
            };

            self.perform(entry, &mut meter, memory);
            instructions_retired += 1;

            record_instruction(opcode, entry.operation.mnemonic());
        }

        Ok(ExecutionReport {
            cycles_spent: meter.spent(),
            instructions_retired,
        })
    }

    fn perform(&mut self, entry: &OpcodeEntry, meter: &mut CycleMeter, memory: &mut Memory) {
        match entry.operation {
            Operation::Lda => {
                self.a = self.read_operand(entry.mode, meter, memory);
                self.set_zero_and_negative_flags(self.a);
            }
            Operation::Ldx => {
                self.x = self.read_operand(entry.mode, meter, memory);
                self.set_zero_and_negative_flags(self.x);
            }
            Operation::Ldy => {
                self.y = self.read_operand(entry.mode, meter, memory);
                self.set_zero_and_negative_flags(self.y);
            }
            Operation::Sta => {
                let address = self.store_address(entry.mode, meter, memory);
                let data = self.a;
                self.write_byte(meter, memory, address, data);
            }
            Operation::Stx => {
                let address = self.store_address(entry.mode, meter, memory);
                let data = self.x;
                self.write_byte(meter, memory, address, data);
            }
            Operation::Sty => {
                let address = self.store_address(entry.mode, meter, memory);
                let data = self.y;
                self.write_byte(meter, memory, address, data);
            }
            Operation::Tax => {
                self.x = self.a;
                meter.tick();
                self.set_zero_and_negative_flags(self.x);
            }
            Operation::Tay => {
                self.y = self.a;
                meter.tick();
                self.set_zero_and_negative_flags(self.y);
            }
            Operation::Txa => {
                self.a = self.x;
                meter.tick();
                self.set_zero_and_negative_flags(self.a);
            }
            Operation::Tya => {
                self.a = self.y;
                meter.tick();
                self.set_zero_and_negative_flags(self.a);
            }
            Operation::Tsx => {
                self.x = self.sp;
                meter.tick();
                self.set_zero_and_negative_flags(self.x);
            }
            Operation::Txs => {
                // TXS affects no flags
                self.sp = self.x;
                meter.tick();
            }
            Operation::Pha => {
                let data = self.a;
                self.push_stack(meter, memory, data);
            }
            Operation::Php => {
                let data = self.status;
                self.push_stack(meter, memory, data);
            }
            Operation::Pla => {
                self.a = self.pop_stack(meter, memory);
                meter.tick();
                self.set_zero_and_negative_flags(self.a);
            }
            Operation::Plp => {
                self.status = self.pop_stack(meter, memory);
                meter.tick();
            }
        }
    }

    fn read_operand(&mut self, mode: AddressingMode, meter: &mut CycleMeter, memory: &Memory) -> u8 {
        match mode {
            AddressingMode::Immediate => self.fetch_byte(meter, memory),
            AddressingMode::ZeroPage => {
                let address = self.zero_page_address(meter, memory) as u16;
                self.read_byte(meter, memory, address)
            }
            AddressingMode::ZeroPageX => {
                let address = self.zero_page_x_address(meter, memory) as u16;
                self.read_byte(meter, memory, address)
            }
            AddressingMode::ZeroPageY => {
                let address = self.zero_page_y_address(meter, memory) as u16;
                self.read_byte(meter, memory, address)
            }
            AddressingMode::Absolute => {
                let address = self.absolute_address(meter, memory);
                self.read_byte(meter, memory, address)
            }
            AddressingMode::AbsoluteX => {
                let address = self.absolute_x_address(meter, memory, true);
                self.read_byte(meter, memory, address)
            }
            AddressingMode::AbsoluteY => {
                let address = self.absolute_y_address(meter, memory, true);
                self.read_byte(meter, memory, address)
            }
            AddressingMode::IndexedIndirect => {
                let address = self.indexed_indirect_address(meter, memory);
                self.read_byte(meter, memory, address)
            }
            AddressingMode::IndirectIndexed => {
                let address = self.indirect_indexed_address(meter, memory, true);
                self.read_byte(meter, memory, address)
            }
            other => unreachable!("no readable operand for {:?}", other),
        }
    }

    fn store_address(
        &mut self,
        mode: AddressingMode,
        meter: &mut CycleMeter,
        memory: &Memory,
    ) -> u16 {
        match mode {
            AddressingMode::ZeroPage => self.zero_page_address(meter, memory) as u16,
            AddressingMode::ZeroPageX => self.zero_page_x_address(meter, memory) as u16,
            AddressingMode::ZeroPageY => self.zero_page_y_address(meter, memory) as u16,
            AddressingMode::Absolute => self.absolute_address(meter, memory),
            AddressingMode::AbsoluteX => self.absolute_x_address(meter, memory, false),
            AddressingMode::AbsoluteY => self.absolute_y_address(meter, memory, false),
            AddressingMode::IndexedIndirect => self.indexed_indirect_address(meter, memory),
            AddressingMode::IndirectIndexed => self.indirect_indexed_address(meter, memory, false),
            other => unreachable!("no store address for {:?}", other),
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Cpu, Memory) {
        let mut cpu = Cpu::new();
        let mut memory = Memory::new();
        cpu.reset(&mut memory);
        (cpu, memory)
    }

    #[test]
    fn reset_parks_pc_at_fffc_and_clears_state() {
        let mut cpu = Cpu::new();
        let mut memory = Memory::new();
        memory.write(0x1234, 0xAB);
        cpu.a = 0x55;
        cpu.status = 0xFF;

        cpu.reset(&mut memory);

        assert_eq!(cpu.pc, 0xFFFC);
        assert_eq!(cpu.sp, 0xFF);
        assert_eq!(cpu.a, 0);
        assert_eq!(cpu.x, 0);
        assert_eq!(cpu.y, 0);
        assert_eq!(cpu.status, 0);
        assert_eq!(memory.read(0x1234), 0);
    }

    #[test]
    fn lda_immediate_loads_and_sets_negative() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$FE
        memory.write(0xFFFD, 0xFE);

        let report = cpu.execute(2, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(cpu.pc, 0xFFFE);
        assert!(cpu.flag_set(NEGATIVE_FLAG));
        assert!(!cpu.flag_set(ZERO_FLAG));
        assert_eq!(report.cycles_spent, 2);
        assert_eq!(report.instructions_retired, 1);
    }

    #[test]
    fn lda_immediate_zero_sets_zero_flag() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$00
        memory.write(0xFFFD, 0x00);

        cpu.execute(2, &mut memory).unwrap();

        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag_set(ZERO_FLAG));
        assert!(!cpu.flag_set(NEGATIVE_FLAG));
    }

    #[test]
    fn zero_and_negative_flags_track_every_loaded_value() {
        for value in 0..=255u8 {
            let (mut cpu, mut memory) = setup();
            memory.write(0xFFFC, 0xA9);
            memory.write(0xFFFD, value);

            cpu.execute(2, &mut memory).unwrap();

            assert_eq!(cpu.flag_set(ZERO_FLAG), value == 0, "Z for {:#04X}", value);
            assert_eq!(
                cpu.flag_set(NEGATIVE_FLAG),
                value & 0x80 != 0,
                "N for {:#04X}",
                value
            );
        }
    }

    #[test]
    fn lda_zero_page() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA5); // LDA $42
        memory.write(0xFFFD, 0x42);
        memory.write(0x0042, 0xFE);

        let report = cpu.execute(3, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 3);
    }

    #[test]
    fn lda_zero_page_x_wraps_within_page_zero() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xB5); // LDA $80,X
        memory.write(0xFFFD, 0x80);
        memory.write(0x007F, 0x37); // (0x80 + 0xFF) mod 256
        cpu.x = 0xFF;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0x37);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn lda_absolute() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xAD); // LDA $AABB
        memory.write(0xFFFD, 0xBB);
        memory.write(0xFFFE, 0xAA);
        memory.write(0xAABB, 0xFE);

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn lda_absolute_x_without_page_cross() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xBD); // LDA $AABB,X
        memory.write(0xFFFD, 0xBB);
        memory.write(0xFFFE, 0xAA);
        memory.write(0xAABC, 0xFE);
        cpu.x = 0x01;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn lda_absolute_x_page_cross_charges_one_extra_cycle() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xBD); // LDA $00FF,X
        memory.write(0xFFFD, 0xFF);
        memory.write(0xFFFE, 0x00);
        memory.write(0x0100, 0xFE);
        cpu.x = 0x01;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert!(cpu.flag_set(NEGATIVE_FLAG));
        assert_eq!(report.cycles_spent, 5);
        assert_eq!(report.instructions_retired, 1);
    }

    #[test]
    fn lda_absolute_y_page_cross_charges_one_extra_cycle() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xB9); // LDA $AAFF,Y
        memory.write(0xFFFD, 0xFF);
        memory.write(0xFFFE, 0xAA);
        memory.write(0xAB00, 0xFE);
        cpu.y = 0x01;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 5);
    }

    #[test]
    fn lda_indexed_indirect() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA1); // LDA ($42,X)
        memory.write(0xFFFD, 0x42);
        memory.write(0x0044, 0x00); // pointer at 0x42 + X
        memory.write(0x0045, 0x80);
        memory.write(0x8000, 0xFE);
        cpu.x = 0x02;

        let report = cpu.execute(6, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 6);
    }

    #[test]
    fn lda_indirect_indexed_without_page_cross() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xB1); // LDA ($42),Y
        memory.write(0xFFFD, 0x42);
        memory.write(0x0042, 0x00);
        memory.write(0x0043, 0x80);
        memory.write(0x8001, 0xFE);
        cpu.y = 0x01;

        let report = cpu.execute(5, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 5);
    }

    #[test]
    fn lda_indirect_indexed_page_cross_charges_one_extra_cycle() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xB1); // LDA ($42),Y
        memory.write(0xFFFD, 0x42);
        memory.write(0x0042, 0xFF);
        memory.write(0x0043, 0x80);
        memory.write(0x8100, 0xFE);
        cpu.y = 0x01;

        let report = cpu.execute(5, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 6);
    }

    #[test]
    fn ldx_zero_page_y_adds_the_y_register() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xB6); // LDX $42,Y
        memory.write(0xFFFD, 0x42);
        memory.write(0x0047, 0x99);
        cpu.y = 0x05;
        cpu.x = 0xFF; // a resolver that indexed by X would read $41 instead

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.x, 0x99);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn ldy_absolute_x() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xBC); // LDY $2000,X
        memory.write(0xFFFD, 0x00);
        memory.write(0xFFFE, 0x20);
        memory.write(0x2003, 0x7F);
        cpu.x = 0x03;

        cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.y, 0x7F);
        assert!(!cpu.flag_set(NEGATIVE_FLAG));
    }

    #[test]
    fn sta_zero_page_writes_without_touching_flags() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x85); // STA $50
        memory.write(0xFFFD, 0x50);
        cpu.a = 0x00;

        let report = cpu.execute(3, &mut memory).unwrap();

        assert_eq!(memory.read(0x0050), 0x00);
        assert_eq!(cpu.status, 0); // stores never touch flags
        assert_eq!(report.cycles_spent, 3);
    }

    #[test]
    fn sta_absolute_x_is_fixed_cost() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x9D); // STA $AABB,X
        memory.write(0xFFFD, 0xBB);
        memory.write(0xFFFE, 0xAA);
        cpu.a = 0x42;
        cpu.x = 0x01;

        let report = cpu.execute(5, &mut memory).unwrap();

        assert_eq!(memory.read(0xAABC), 0x42);
        assert_eq!(report.cycles_spent, 5);
    }

    #[test]
    fn sta_indirect_indexed() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x91); // STA ($42),Y
        memory.write(0xFFFD, 0x42);
        memory.write(0x0042, 0x00);
        memory.write(0x0043, 0x80);
        cpu.a = 0x42;
        cpu.y = 0x04;

        let report = cpu.execute(6, &mut memory).unwrap();

        assert_eq!(memory.read(0x8004), 0x42);
        assert_eq!(report.cycles_spent, 6);
    }

    #[test]
    fn stx_zero_page_y_stores_at_base_plus_y() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x96); // STX $42,Y
        memory.write(0xFFFD, 0x42);
        cpu.y = 0x05;
        cpu.x = 0xFE;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(memory.read(0x0047), 0xFE);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn sty_absolute() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x8C); // STY $1234
        memory.write(0xFFFD, 0x34);
        memory.write(0xFFFE, 0x12);
        cpu.y = 0x77;

        cpu.execute(4, &mut memory).unwrap();

        assert_eq!(memory.read(0x1234), 0x77);
    }

    #[test]
    fn register_transfers_update_flags() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$FE
        memory.write(0xFFFD, 0xFE);
        memory.write(0xFFFE, 0xAA); // TAX
        memory.write(0xFFFF, 0xA8); // TAY

        let report = cpu.execute(6, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(cpu.x, 0xFE);
        assert_eq!(cpu.y, 0xFE);
        assert!(cpu.flag_set(NEGATIVE_FLAG));
        assert_eq!(report.cycles_spent, 6);
        assert_eq!(report.instructions_retired, 3);
    }

    #[test]
    fn txa_and_tya_transfer_into_the_accumulator() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x8A); // TXA
        memory.write(0xFFFD, 0x98); // TYA
        cpu.x = 0x21;
        cpu.y = 0x7B;

        cpu.execute(2, &mut memory).unwrap();
        assert_eq!(cpu.a, 0x21);

        cpu.execute(2, &mut memory).unwrap();
        assert_eq!(cpu.a, 0x7B);
    }

    #[test]
    fn tsx_copies_stack_pointer_and_sets_flags() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xBA); // TSX

        let report = cpu.execute(2, &mut memory).unwrap();

        assert_eq!(cpu.x, 0xFF);
        assert!(cpu.flag_set(NEGATIVE_FLAG));
        assert_eq!(report.cycles_spent, 2);
    }

    #[test]
    fn txs_copies_x_and_touches_no_flags() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x9A); // TXS
        cpu.x = 0xFE;

        let report = cpu.execute(2, &mut memory).unwrap();

        assert_eq!(cpu.sp, 0xFE);
        assert_eq!(cpu.status, 0);
        assert_eq!(report.cycles_spent, 2);
    }

    #[test]
    fn pha_pushes_accumulator() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x48); // PHA
        cpu.a = 0x42;

        let report = cpu.execute(3, &mut memory).unwrap();

        assert_eq!(memory.read(0x01FF), 0x42);
        assert_eq!(cpu.sp, 0xFE);
        assert_eq!(report.cycles_spent, 3);
    }

    #[test]
    fn php_pushes_status() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x08); // PHP
        cpu.status = 0x42;

        cpu.execute(3, &mut memory).unwrap();

        assert_eq!(memory.read(0x01FF), 0x42);
        assert_eq!(cpu.sp, 0xFE);
    }

    #[test]
    fn pla_pulls_accumulator_and_sets_flags() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x68); // PLA
        memory.write(0x01FF, 0x80);
        cpu.sp = 0xFE;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0x80);
        assert_eq!(cpu.sp, 0xFF);
        assert!(cpu.flag_set(NEGATIVE_FLAG));
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn plp_replaces_the_status_byte() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0x28); // PLP
        memory.write(0x01FF, 0x42);
        cpu.sp = 0xFE;
        cpu.status = 0xFF;

        let report = cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.status, 0x42);
        assert_eq!(report.cycles_spent, 4);
    }

    #[test]
    fn push_pop_round_trip_restores_value_and_stack_pointer() {
        for value in [0x00u8, 0x01, 0x7F, 0x80, 0xFF] {
            let (mut cpu, mut memory) = setup();
            memory.write(0xFFFC, 0xA9); // LDA #value
            memory.write(0xFFFD, value);
            memory.write(0xFFFE, 0x48); // PHA
            memory.write(0xFFFF, 0xA9); // LDA #$00
            memory.write(0x0000, 0x00); // PC wraps past 0xFFFF
            memory.write(0x0001, 0x68); // PLA

            cpu.execute(2 + 3 + 2 + 4, &mut memory).unwrap();

            assert_eq!(cpu.a, value);
            assert_eq!(cpu.sp, 0xFF);
        }
    }

    #[test]
    fn zero_flag_is_sticky_across_loads() {
        // The flag helper is set-only: LDA #$00 raises Z and a later
        // non-zero load does not clear it.
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$00
        memory.write(0xFFFD, 0x00);
        memory.write(0xFFFE, 0xA9); // LDA #$42
        memory.write(0xFFFF, 0x42);

        cpu.execute(4, &mut memory).unwrap();

        assert_eq!(cpu.a, 0x42);
        assert!(cpu.flag_set(ZERO_FLAG));
    }

    #[test]
    fn unknown_opcode_reports_byte_and_fetch_address() {
        let (mut cpu, mut memory) = setup();
        cpu.pc = 0x0300;
        memory.write(0x0300, 0xFF);

        let err = cpu.execute(2, &mut memory).unwrap_err();

        assert_eq!(
            err,
            CpuError::UnknownOpcode {
                opcode: 0xFF,
                address: 0x0300,
            }
        );
        assert_eq!(
            err.to_string(),
            "unknown opcode $FF at address $0300"
        );
    }

    #[test]
    fn final_instruction_may_overspend_the_budget() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$FE, 2 cycles
        memory.write(0xFFFD, 0xFE);

        let report = cpu.execute(1, &mut memory).unwrap();

        assert_eq!(cpu.a, 0xFE);
        assert_eq!(report.cycles_spent, 2);
        assert_eq!(report.instructions_retired, 1);
    }

    #[test]
    fn execution_resumes_where_it_stopped() {
        let (mut cpu, mut memory) = setup();
        memory.write(0xFFFC, 0xA9); // LDA #$01
        memory.write(0xFFFD, 0x01);
        memory.write(0xFFFE, 0xAA); // TAX
        memory.write(0xFFFF, 0xA8); // TAY

        cpu.execute(2, &mut memory).unwrap();
        assert_eq!(cpu.a, 0x01);
        assert_eq!(cpu.x, 0x00);

        cpu.execute(2, &mut memory).unwrap();
        assert_eq!(cpu.x, 0x01);

        cpu.execute(2, &mut memory).unwrap();
        assert_eq!(cpu.y, 0x01);
    }

    #[test]
    fn indirect_resolver_follows_the_pointer() {
        let (mut cpu, mut memory) = setup();
        cpu.pc = 0x0200;
        memory.write(0x0200, 0x34);
        memory.write(0x0201, 0x12);
        memory.write(0x1234, 0xCD);
        memory.write(0x1235, 0xAB);
        let mut meter = CycleMeter::new(10);

        let address = cpu.indirect_address(&mut meter, &memory);

        assert_eq!(address, 0xABCD);
        assert_eq!(meter.spent(), 4);
    }

    #[test]
    fn relative_resolver_sign_extends_the_offset() {
        let (mut cpu, mut memory) = setup();
        cpu.pc = 0x0200;
        memory.write(0x0200, 0xFE); // -2

        let mut meter = CycleMeter::new(10);
        let address = cpu.relative_address(&mut meter, &memory);
        assert_eq!(address, 0x01FF); // 0x0201 - 2
        assert_eq!(meter.spent(), 2);

        cpu.pc = 0x0200;
        memory.write(0x0200, 0x10); // +16
        let mut meter = CycleMeter::new(10);
        let address = cpu.relative_address(&mut meter, &memory);
        assert_eq!(address, 0x0211);
    }

    #[test]
    fn page_crossing_is_detected_by_high_byte_change() {
        // 0x00FE + 1 stays on page 0: no penalty
        let (mut cpu, mut memory) = setup();
        cpu.pc = 0x0200;
        memory.write(0x0200, 0xFE);
        memory.write(0x0201, 0x00);
        cpu.y = 0x01;
        let mut meter = CycleMeter::new(10);
        assert_eq!(cpu.absolute_y_address(&mut meter, &memory, true), 0x00FF);
        assert_eq!(meter.spent(), 2);

        // 0x00FF + 1 lands on page 1: one extra cycle, granted then spent
        cpu.pc = 0x0200;
        memory.write(0x0200, 0xFF);
        let mut meter = CycleMeter::new(10);
        assert_eq!(cpu.absolute_y_address(&mut meter, &memory, true), 0x0100);
        assert_eq!(meter.spent(), 3);
        assert_eq!(meter.remaining(), 8);
    }

    #[test]
    fn cycle_meter_can_go_negative() {
        let mut meter = CycleMeter::new(1);
        assert!(meter.running());
        meter.tick();
        assert!(!meter.running());
        meter.tick();
        assert_eq!(meter.remaining(), -1);
        assert_eq!(meter.spent(), 2);
    }

    #[test]
    fn cycle_meter_grant_extends_the_budget() {
        let mut meter = CycleMeter::new(1);
        meter.grant_extra();
        meter.tick();
        assert!(meter.running());
        assert_eq!(meter.spent(), 1);
        assert_eq!(meter.remaining(), 1);
    }

    #[test]
    fn flag_primitives() {
        let mut cpu = Cpu::new();
        assert!(!cpu.flag_set(CARRY_FLAG));
        cpu.set_flag(CARRY_FLAG);
        assert!(cpu.flag_set(CARRY_FLAG));
        cpu.toggle_flag(CARRY_FLAG);
        assert!(!cpu.flag_set(CARRY_FLAG));
        cpu.set_flag(OVERFLOW_FLAG | DECIMAL_MODE);
        cpu.clear_flag(DECIMAL_MODE);
        assert!(cpu.flag_set(OVERFLOW_FLAG));
        assert!(!cpu.flag_set(DECIMAL_MODE));
    }
}
