use crate::bits;

/// An unprefixed Z80 opcode split into its `x`, `y` and `z` octal fields.
///
/// Laid out as `xx yyy zzz`; `y` further splits into `p` (bits 5-4) and `q` (bit 3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Opcode {
    x: u8,
    y: u8,
    z: u8,
}
impl Opcode {
    pub fn x(&self) -> u8 {
        self.x
    }
    pub fn y(&self) -> u8 {
        self.y
    }
    pub fn z(&self) -> u8 {
        self.z
    }
    pub fn p(&self) -> u8 {
        self.y >> 1
    }
    pub fn q(&self) -> bool {
        bits::is_set(self.y, 0)
    }
}
impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        Self {
            x: bits::extract(value, 6, 2),
            y: bits::extract(value, 3, 3),
            z: bits::extract(value, 0, 3),
        }
    }
}

/// A branch condition, indexed by the `y` field of conditional jumps, calls and returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    NonZero,
    Zero,
    NoCarry,
    Carry,
    ParityOdd,
    ParityEven,
    Plus,
    Minus,
}
impl From<u8> for Condition {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::NonZero,
            1 => Self::Zero,
            2 => Self::NoCarry,
            3 => Self::Carry,
            4 => Self::ParityOdd,
            5 => Self::ParityEven,
            6 => Self::Plus,
            _ => Self::Minus,
        }
    }
}

/// An 8-bit accumulator operation, indexed by the `y` field of `x = 2` and `x = 3, z = 6` opcodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}
impl From<u8> for AluOp {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            0 => Self::Add,
            1 => Self::Adc,
            2 => Self::Sub,
            3 => Self::Sbc,
            4 => Self::And,
            5 => Self::Xor,
            6 => Self::Or,
            _ => Self::Cp,
        }
    }
}
