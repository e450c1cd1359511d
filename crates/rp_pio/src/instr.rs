// crates/rp_pio/src/instr.rs
// PIO instruction set: 16-bit encoding, decoding and the SDK-style encoders.
//
// Layout of every instruction:
//   15..13 opcode | 12..8 delay | 7..0 operands

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JmpCond {
    Always,
    XZero,
    XDec, // X-- (jump while X was non-zero)
    YZero,
    YDec,
    XNeY,
    Pin,
    OsrNotEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSrc {
    Gpio, // absolute pin number
    Pin,  // relative to IN_BASE
    Irq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSrc {
    Pins,
    X,
    Y,
    Null,
    Isr,
    Osr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutDest {
    Pins,
    X,
    Y,
    Null,
    PinDirs,
    Pc,
    Isr,
    Exec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovDest {
    Pins,
    X,
    Y,
    Exec,
    Pc,
    Isr,
    Osr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovOp {
    None,
    Invert,
    Reverse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovSrc {
    Pins,
    X,
    Y,
    Null,
    Status,
    Isr,
    Osr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetDest {
    Pins,
    X,
    Y,
    PinDirs,
}

/// A decoded PIO instruction (delay field excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    Jmp { cond: JmpCond, addr: u8 },
    Wait { polarity: bool, src: WaitSrc, index: u8 },
    In { src: InSrc, count: u8 },
    Out { dest: OutDest, count: u8 },
    Push { if_full: bool, block: bool },
    Pull { if_empty: bool, block: bool },
    Mov { dest: MovDest, op: MovOp, src: MovSrc },
    Irq { clear: bool, wait: bool, index: u8 },
    Set { dest: SetDest, data: u8 },
}

const OP_JMP: u16 = 0b000 << 13;
const OP_WAIT: u16 = 0b001 << 13;
const OP_IN: u16 = 0b010 << 13;
const OP_OUT: u16 = 0b011 << 13;
const OP_PUSH_PULL: u16 = 0b100 << 13;
const OP_MOV: u16 = 0b101 << 13;
const OP_IRQ: u16 = 0b110 << 13;
const OP_SET: u16 = 0b111 << 13;

/// Bit counts are 5-bit fields where 0 means 32.
fn encode_count(count: u8) -> u16 {
    (count as u16) & 0x1F
}

fn decode_count(field: u16) -> u8 {
    match field & 0x1F {
        0 => 32,
        n => n as u8,
    }
}

impl Instr {
    /// Decodes one instruction word. Reserved encodings yield `None`.
    pub fn decode(word: u16) -> Option<Instr> {
        let arg1 = (word >> 5) & 0x7;
        let arg2 = word & 0x1F;
        let instr = match word & 0xE000 {
            OP_JMP => Instr::Jmp {
                cond: match arg1 {
                    0 => JmpCond::Always,
                    1 => JmpCond::XZero,
                    2 => JmpCond::XDec,
                    3 => JmpCond::YZero,
                    4 => JmpCond::YDec,
                    5 => JmpCond::XNeY,
                    6 => JmpCond::Pin,
                    _ => JmpCond::OsrNotEmpty,
                },
                addr: arg2 as u8,
            },
            OP_WAIT => Instr::Wait {
                polarity: word & 0x80 != 0,
                src: match (word >> 5) & 0x3 {
                    0 => WaitSrc::Gpio,
                    1 => WaitSrc::Pin,
                    2 => WaitSrc::Irq,
                    _ => return None,
                },
                index: arg2 as u8,
            },
            OP_IN => Instr::In {
                src: match arg1 {
                    0 => InSrc::Pins,
                    1 => InSrc::X,
                    2 => InSrc::Y,
                    3 => InSrc::Null,
                    6 => InSrc::Isr,
                    7 => InSrc::Osr,
                    _ => return None,
                },
                count: decode_count(arg2),
            },
            OP_OUT => Instr::Out {
                dest: match arg1 {
                    0 => OutDest::Pins,
                    1 => OutDest::X,
                    2 => OutDest::Y,
                    3 => OutDest::Null,
                    4 => OutDest::PinDirs,
                    5 => OutDest::Pc,
                    6 => OutDest::Isr,
                    _ => OutDest::Exec,
                },
                count: decode_count(arg2),
            },
            OP_PUSH_PULL => {
                let flag = word & 0x40 != 0;
                let block = word & 0x20 != 0;
                if word & 0x80 == 0 {
                    Instr::Push { if_full: flag, block }
                } else {
                    Instr::Pull { if_empty: flag, block }
                }
            }
            OP_MOV => Instr::Mov {
                dest: match arg1 {
                    0 => MovDest::Pins,
                    1 => MovDest::X,
                    2 => MovDest::Y,
                    4 => MovDest::Exec,
                    5 => MovDest::Pc,
                    6 => MovDest::Isr,
                    7 => MovDest::Osr,
                    _ => return None,
                },
                op: match (word >> 3) & 0x3 {
                    0 => MovOp::None,
                    1 => MovOp::Invert,
                    2 => MovOp::Reverse,
                    _ => return None,
                },
                src: match word & 0x7 {
                    0 => MovSrc::Pins,
                    1 => MovSrc::X,
                    2 => MovSrc::Y,
                    3 => MovSrc::Null,
                    5 => MovSrc::Status,
                    6 => MovSrc::Isr,
                    7 => MovSrc::Osr,
                    _ => return None,
                },
            },
            OP_IRQ => Instr::Irq {
                clear: word & 0x40 != 0,
                wait: word & 0x20 != 0,
                index: (word & 0x7) as u8,
            },
            _ => Instr::Set {
                dest: match arg1 {
                    0 => SetDest::Pins,
                    1 => SetDest::X,
                    2 => SetDest::Y,
                    4 => SetDest::PinDirs,
                    _ => return None,
                },
                data: arg2 as u8,
            },
        };
        Some(instr)
    }

    /// Encodes the instruction with no delay.
    pub fn encode(self) -> u16 {
        match self {
            Instr::Jmp { cond, addr } => {
                let c = match cond {
                    JmpCond::Always => 0,
                    JmpCond::XZero => 1,
                    JmpCond::XDec => 2,
                    JmpCond::YZero => 3,
                    JmpCond::YDec => 4,
                    JmpCond::XNeY => 5,
                    JmpCond::Pin => 6,
                    JmpCond::OsrNotEmpty => 7,
                };
                OP_JMP | (c << 5) | (addr as u16 & 0x1F)
            }
            Instr::Wait { polarity, src, index } => {
                let s = match src {
                    WaitSrc::Gpio => 0,
                    WaitSrc::Pin => 1,
                    WaitSrc::Irq => 2,
                };
                OP_WAIT | ((polarity as u16) << 7) | (s << 5) | (index as u16 & 0x1F)
            }
            Instr::In { src, count } => {
                let s = match src {
                    InSrc::Pins => 0,
                    InSrc::X => 1,
                    InSrc::Y => 2,
                    InSrc::Null => 3,
                    InSrc::Isr => 6,
                    InSrc::Osr => 7,
                };
                OP_IN | (s << 5) | encode_count(count)
            }
            Instr::Out { dest, count } => {
                let d = match dest {
                    OutDest::Pins => 0,
                    OutDest::X => 1,
                    OutDest::Y => 2,
                    OutDest::Null => 3,
                    OutDest::PinDirs => 4,
                    OutDest::Pc => 5,
                    OutDest::Isr => 6,
                    OutDest::Exec => 7,
                };
                OP_OUT | (d << 5) | encode_count(count)
            }
            Instr::Push { if_full, block } => {
                OP_PUSH_PULL | ((if_full as u16) << 6) | ((block as u16) << 5)
            }
            Instr::Pull { if_empty, block } => {
                OP_PUSH_PULL | 0x80 | ((if_empty as u16) << 6) | ((block as u16) << 5)
            }
            Instr::Mov { dest, op, src } => {
                let d = match dest {
                    MovDest::Pins => 0,
                    MovDest::X => 1,
                    MovDest::Y => 2,
                    MovDest::Exec => 4,
                    MovDest::Pc => 5,
                    MovDest::Isr => 6,
                    MovDest::Osr => 7,
                };
                let o = match op {
                    MovOp::None => 0,
                    MovOp::Invert => 1,
                    MovOp::Reverse => 2,
                };
                let s = match src {
                    MovSrc::Pins => 0,
                    MovSrc::X => 1,
                    MovSrc::Y => 2,
                    MovSrc::Null => 3,
                    MovSrc::Status => 5,
                    MovSrc::Isr => 6,
                    MovSrc::Osr => 7,
                };
                OP_MOV | (d << 5) | (o << 3) | s
            }
            Instr::Irq { clear, wait, index } => {
                OP_IRQ | ((clear as u16) << 6) | ((wait as u16) << 5) | (index as u16 & 0x7)
            }
            Instr::Set { dest, data } => {
                let d = match dest {
                    SetDest::Pins => 0,
                    SetDest::X => 1,
                    SetDest::Y => 2,
                    SetDest::PinDirs => 4,
                };
                OP_SET | (d << 5) | (data as u16 & 0x1F)
            }
        }
    }
}

/// Delay cycles carried in bits 12..8.
pub fn delay_of(word: u16) -> u8 {
    ((word >> 8) & 0x1F) as u8
}

pub fn with_delay(word: u16, delay: u8) -> u16 {
    (word & !0x1F00) | ((delay as u16 & 0x1F) << 8)
}

pub fn is_jmp(word: u16) -> bool {
    word & 0xE000 == OP_JMP
}

// ============================================================================
//  ENCODERS (same names as the C SDK helpers)
// ============================================================================

pub fn encode_jmp(addr: u8) -> u16 {
    Instr::Jmp { cond: JmpCond::Always, addr }.encode()
}

pub fn encode_jmp_x_dec(addr: u8) -> u16 {
    Instr::Jmp { cond: JmpCond::XDec, addr }.encode()
}

pub fn encode_jmp_pin(addr: u8) -> u16 {
    Instr::Jmp { cond: JmpCond::Pin, addr }.encode()
}

pub fn encode_wait_pin(polarity: bool, index: u8) -> u16 {
    Instr::Wait { polarity, src: WaitSrc::Pin, index }.encode()
}

pub fn encode_wait_gpio(polarity: bool, pin: u8) -> u16 {
    Instr::Wait { polarity, src: WaitSrc::Gpio, index: pin }.encode()
}

pub fn encode_in(src: InSrc, count: u8) -> u16 {
    Instr::In { src, count }.encode()
}

pub fn encode_out(dest: OutDest, count: u8) -> u16 {
    Instr::Out { dest, count }.encode()
}

pub fn encode_push(if_full: bool, block: bool) -> u16 {
    Instr::Push { if_full, block }.encode()
}

pub fn encode_pull(if_empty: bool, block: bool) -> u16 {
    Instr::Pull { if_empty, block }.encode()
}

pub fn encode_mov(dest: MovDest, src: MovSrc) -> u16 {
    Instr::Mov { dest, op: MovOp::None, src }.encode()
}

pub fn encode_set(dest: SetDest, data: u8) -> u16 {
    Instr::Set { dest, data }.encode()
}

/// `mov y, y`
pub fn encode_nop() -> u16 {
    encode_mov(MovDest::Y, MovSrc::Y)
}
