use std::ops::{BitAnd, Not, Shl, Shr};

use num_traits::{One, Zero};

/// Applies a signed 8-bit displacement to a 16-bit address, wrapping around the address space.
pub fn displace(base: u16, displacement: u8) -> u16 {
    base.wrapping_add(displacement as i8 as u16)
}

/// Isolates bits `lsb` to `lsb + count` from `value` and moves them to bits 0-`count`.
///
/// Useful for extracting from bitfields.
pub fn extract<
    T: Zero + Not<Output = T> + Shr<Output = T> + Shl<Output = T> + BitAnd<Output = T>,
>(
    value: T,
    lsb: T,
    count: T,
) -> T {
    (value >> lsb) & !(!T::zero() << count)
}

/// Checks if a single bit is set.
pub fn is_set<T: Zero + One + BitAnd<Output = T> + Shl<Output = T> + PartialEq>(
    value: T,
    bit: T,
) -> bool {
    (value & (T::one() << bit)) != T::zero()
}

/// Whether `value` has an even number of set bits.
pub fn even_parity(value: u8) -> bool {
    value.count_ones() % 2 == 0
}

/// Combines a high and low byte into a word.
pub fn join(high: u8, low: u8) -> u16 {
    ((high as u16) << 8) | low as u16
}

/// Splits a word into its `(high, low)` bytes.
pub fn split(word: u16) -> (u8, u8) {
    ((word >> 8) as u8, (word & 0xff) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_is_signed() {
        assert_eq!(displace(0x0102, 0x02), 0x0104);
        assert_eq!(displace(0x0102, 0xfe), 0x0100);
        assert_eq!(displace(0x0000, 0xff), 0xffff);
    }

    #[test]
    fn extracts_opcode_fields() {
        // 0b01_110_110 is HALT: x = 1, y = 6, z = 6
        assert_eq!(extract(0b0111_0110u8, 6, 2), 1);
        assert_eq!(extract(0b0111_0110u8, 3, 3), 6);
        assert_eq!(extract(0b0111_0110u8, 0, 3), 6);
        assert!(is_set(0x80u8, 7));
        assert!(!is_set(0x7fu8, 7));
    }

    #[test]
    fn words_round_through_bytes() {
        assert_eq!(join(0x12, 0x34), 0x1234);
        assert_eq!(split(0xabcd), (0xab, 0xcd));
        assert!(even_parity(0x00));
        assert!(!even_parity(0x01));
        assert!(even_parity(0x03));
    }
}
