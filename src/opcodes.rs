//! Canonical opcode table.
//!
//! One table keyed by opcode byte value maps to the operation, the
//! addressing mode and the base cycle cost. New instructions are additive
//! entries here; the dispatch loop never changes shape. Base cycle values
//! are the documented NMOS 6502 timings and are treated as a fixed external
//! contract.

use crate::cpu::AddressingMode;

/// Semantic action of an instruction, independent of addressing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Lda,
    Ldx,
    Ldy,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Txa,
    Tya,
    Tsx,
    Txs,
    Pha,
    Php,
    Pla,
    Plp,
}

impl Operation {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Operation::Lda => "LDA",
            Operation::Ldx => "LDX",
            Operation::Ldy => "LDY",
            Operation::Sta => "STA",
            Operation::Stx => "STX",
            Operation::Sty => "STY",
            Operation::Tax => "TAX",
            Operation::Tay => "TAY",
            Operation::Txa => "TXA",
            Operation::Tya => "TYA",
            Operation::Tsx => "TSX",
            Operation::Txs => "TXS",
            Operation::Pha => "PHA",
            Operation::Php => "PHP",
            Operation::Pla => "PLA",
            Operation::Plp => "PLP",
        }
    }
}

/// Everything the dispatch loop needs to know about one opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub operation: Operation,
    pub mode: AddressingMode,
    /// Cycle cost before page-crossing penalties.
    pub base_cycles: u8,
}

use self::Operation::*;
use crate::cpu::AddressingMode::*;

const ENTRIES: [(u8, Operation, AddressingMode, u8); 41] = [
    // LDA
    (0xA9, Lda, Immediate, 2),
    (0xA5, Lda, ZeroPage, 3),
    (0xB5, Lda, ZeroPageX, 4),
    (0xAD, Lda, Absolute, 4),
    (0xBD, Lda, AbsoluteX, 4),
    (0xB9, Lda, AbsoluteY, 4),
    (0xA1, Lda, IndexedIndirect, 6),
    (0xB1, Lda, IndirectIndexed, 5),
    // LDX
    (0xA2, Ldx, Immediate, 2),
    (0xA6, Ldx, ZeroPage, 3),
    (0xB6, Ldx, ZeroPageY, 4),
    (0xAE, Ldx, Absolute, 4),
    (0xBE, Ldx, AbsoluteY, 4),
    // LDY
    (0xA0, Ldy, Immediate, 2),
    (0xA4, Ldy, ZeroPage, 3),
    (0xB4, Ldy, ZeroPageX, 4),
    (0xAC, Ldy, Absolute, 4),
    (0xBC, Ldy, AbsoluteX, 4),
    // STA
    (0x85, Sta, ZeroPage, 3),
    (0x95, Sta, ZeroPageX, 4),
    (0x8D, Sta, Absolute, 4),
    (0x9D, Sta, AbsoluteX, 5),
    (0x99, Sta, AbsoluteY, 5),
    (0x81, Sta, IndexedIndirect, 6),
    (0x91, Sta, IndirectIndexed, 6),
    // STX
    (0x86, Stx, ZeroPage, 3),
    (0x96, Stx, ZeroPageY, 4),
    (0x8E, Stx, Absolute, 4),
    // STY
    (0x84, Sty, ZeroPage, 3),
    (0x94, Sty, ZeroPageX, 4),
    (0x8C, Sty, Absolute, 4),
    // Register transfers
    (0xAA, Tax, Implicit, 2),
    (0xA8, Tay, Implicit, 2),
    (0x8A, Txa, Implicit, 2),
    (0x98, Tya, Implicit, 2),
    (0xBA, Tsx, Implicit, 2),
    (0x9A, Txs, Implicit, 2),
    // Stack
    (0x48, Pha, Implicit, 3),
    (0x08, Php, Implicit, 3),
    (0x68, Pla, Implicit, 4),
    (0x28, Plp, Implicit, 4),
];

/// 256-slot decode table, built at compile time. Assigning two entries to
/// the same byte value fails const evaluation.
pub static OPCODE_TABLE: [Option<OpcodeEntry>; 256] = build_table();

const fn build_table() -> [Option<OpcodeEntry>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < ENTRIES.len() {
        let (code, operation, mode, base_cycles) = ENTRIES[i];
        if table[code as usize].is_some() {
            panic!("opcode byte mapped twice");
        }
        table[code as usize] = Some(OpcodeEntry {
            operation,
            mode,
            base_cycles,
        });
        i += 1;
    }
    table
}

/// Look up an opcode byte. `None` means the byte is not a mapped instruction.
pub fn decode(opcode: u8) -> Option<&'static OpcodeEntry> {
    OPCODE_TABLE[opcode as usize].as_ref()
}
