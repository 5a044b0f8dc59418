//! A Z80 interpreter covering the unprefixed opcode table.
//!
//! This is the 8080-compatible core plus the Z80's relative jumps and register exchanges,
//! which is what a CP/M program needs to reach the BDOS entry point and the warm-boot vector.
//! The `CB`, `DD`, `ED` and `FD` prefix groups are not implemented and fail with
//! [`ExecutionError::Unimplemented`].

use crate::{
    bits,
    exec::{Cpu, ExecutionError, PortIo, Register, RegisterPair},
    instruction::{AluOp, Condition, Opcode},
    mem::Memory,
};

pub const FLAG_C: u8 = 0x01;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_PV: u8 = 0x04;
pub const FLAG_X: u8 = 0x08;
pub const FLAG_H: u8 = 0x10;
pub const FLAG_Y: u8 = 0x20;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_S: u8 = 0x80;

/// Sign, zero and the two undocumented copy bits of a result.
fn sz_flags(value: u8) -> u8 {
    let zero = if value == 0 { FLAG_Z } else { 0 };
    (value & (FLAG_S | FLAG_Y | FLAG_X)) | zero
}

/// Like [`sz_flags`], with parity in P/V.
fn szp_flags(value: u8) -> u8 {
    let parity = if bits::even_parity(value) { FLAG_PV } else { 0 };
    sz_flags(value) | parity
}

/// A Zilog Z80 processor attached to its own memory.
///
/// Registers start at their power-on values: `AF` and `SP` at `0xffff`, everything else zero.
///
/// ### Execution
/// Execution is done through [`Cpu::step`], which fetches the opcode at the program counter
/// and executes it. Port accesses made by `IN A,(n)` and `OUT (n),A` are handed to the
/// [`PortIo`] passed to `step`.
#[derive(Clone, Debug)]
pub struct Z80<M> {
    a: u8,
    f: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    // AF', BC', DE', HL'
    alternate: [u16; 4],
    sp: u16,
    pc: u16,
    iff1: bool,
    memory: M,
}
impl<M: Memory> Z80<M> {
    pub fn new(memory: M) -> Self {
        Self {
            a: 0xff,
            f: 0xff,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            alternate: [0; 4],
            sp: 0xffff,
            pc: 0,
            iff1: false,
            memory,
        }
    }

    /// Sets an 8-bit register.
    pub fn set_register(&mut self, register: Register, value: u8) {
        match register {
            Register::A => self.a = value,
            Register::F => self.f = value,
            Register::B => self.b = value,
            Register::C => self.c = value,
            Register::D => self.d = value,
            Register::E => self.e = value,
            Register::H => self.h = value,
            Register::L => self.l = value,
        }
    }
    /// Sets a register pair.
    pub fn set_register_pair(&mut self, pair: RegisterPair, value: u16) {
        let (high, low) = bits::split(value);
        match pair {
            RegisterPair::AF => (self.a, self.f) = (high, low),
            RegisterPair::BC => (self.b, self.c) = (high, low),
            RegisterPair::DE => (self.d, self.e) = (high, low),
            RegisterPair::HL => (self.h, self.l) = (high, low),
            RegisterPair::SP => self.sp = value,
        }
    }

    /// Whether maskable interrupts are enabled.
    pub fn interrupts_enabled(&self) -> bool {
        self.iff1
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }
    fn hl(&self) -> u16 {
        bits::join(self.h, self.l)
    }
    fn set_hl(&mut self, value: u16) {
        (self.h, self.l) = bits::split(value);
    }

    fn fetch_u8(&mut self) -> u8 {
        let value = self.memory.load_u8(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }
    fn fetch_u16(&mut self) -> u16 {
        let value = self.memory.load_u16(self.pc);
        self.pc = self.pc.wrapping_add(2);
        value
    }
    fn push(&mut self, value: u16) {
        self.sp = self.sp.wrapping_sub(2);
        self.memory.store_u16(self.sp, value);
    }
    fn pop(&mut self) -> u16 {
        let value = self.memory.load_u16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        value
    }

    /// Reads the `r` operand table: B, C, D, E, H, L, (HL), A.
    fn read_r(&self, index: u8) -> u8 {
        match index & 0b111 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => self.memory.load_u8(self.hl()),
            _ => self.a,
        }
    }
    fn write_r(&mut self, index: u8, value: u8) {
        match index & 0b111 {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => self.memory.store_u8(self.hl(), value),
            _ => self.a = value,
        }
    }

    /// Reads the `rp` operand table: BC, DE, HL, SP.
    fn read_rp(&self, index: u8) -> u16 {
        match index & 0b11 {
            0 => bits::join(self.b, self.c),
            1 => bits::join(self.d, self.e),
            2 => self.hl(),
            _ => self.sp,
        }
    }
    fn write_rp(&mut self, index: u8, value: u16) {
        match index & 0b11 {
            0 => self.set_register_pair(RegisterPair::BC, value),
            1 => self.set_register_pair(RegisterPair::DE, value),
            2 => self.set_hl(value),
            _ => self.sp = value,
        }
    }
    /// Reads the `rp2` operand table: BC, DE, HL, AF.
    fn read_rp2(&self, index: u8) -> u16 {
        match index & 0b11 {
            3 => bits::join(self.a, self.f),
            index => self.read_rp(index),
        }
    }
    fn write_rp2(&mut self, index: u8, value: u16) {
        match index & 0b11 {
            3 => self.set_register_pair(RegisterPair::AF, value),
            index => self.write_rp(index, value),
        }
    }

    fn condition(&self, condition: Condition) -> bool {
        match condition {
            Condition::NonZero => !self.flag(FLAG_Z),
            Condition::Zero => self.flag(FLAG_Z),
            Condition::NoCarry => !self.flag(FLAG_C),
            Condition::Carry => self.flag(FLAG_C),
            Condition::ParityOdd => !self.flag(FLAG_PV),
            Condition::ParityEven => self.flag(FLAG_PV),
            Condition::Plus => !self.flag(FLAG_S),
            Condition::Minus => self.flag(FLAG_S),
        }
    }

    fn add8(&mut self, value: u8, carry: bool) {
        let a = self.a;
        let wide = a as u16 + value as u16 + carry as u16;
        let result = wide as u8;
        let overflow = (a ^ value) & 0x80 == 0 && (a ^ result) & 0x80 != 0;
        self.f = sz_flags(result)
            | ((a ^ value ^ result) & FLAG_H)
            | if overflow { FLAG_PV } else { 0 }
            | if wide > 0xff { FLAG_C } else { 0 };
        self.a = result;
    }
    /// Subtracts from the accumulator, setting flags. Returns the result without storing it.
    fn sub8(&mut self, value: u8, carry: bool) -> u8 {
        let a = self.a;
        let wide = a as i16 - value as i16 - carry as i16;
        let result = wide as u8;
        let overflow = (a ^ value) & 0x80 != 0 && (a ^ result) & 0x80 != 0;
        self.f = sz_flags(result)
            | ((a ^ value ^ result) & FLAG_H)
            | if overflow { FLAG_PV } else { 0 }
            | FLAG_N
            | if wide < 0 { FLAG_C } else { 0 };
        result
    }
    fn alu(&mut self, operation: AluOp, value: u8) {
        match operation {
            AluOp::Add => self.add8(value, false),
            AluOp::Adc => self.add8(value, self.flag(FLAG_C)),
            AluOp::Sub => self.a = self.sub8(value, false),
            AluOp::Sbc => self.a = self.sub8(value, self.flag(FLAG_C)),
            AluOp::And => {
                self.a &= value;
                self.f = szp_flags(self.a) | FLAG_H;
            }
            AluOp::Xor => {
                self.a ^= value;
                self.f = szp_flags(self.a);
            }
            AluOp::Or => {
                self.a |= value;
                self.f = szp_flags(self.a);
            }
            AluOp::Cp => {
                self.sub8(value, false);
                // the copy bits come from the operand, not the discarded result
                self.f = (self.f & !(FLAG_X | FLAG_Y)) | (value & (FLAG_X | FLAG_Y));
            }
        }
    }
    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.f = (self.f & FLAG_C)
            | sz_flags(result)
            | if value & 0x0f == 0x0f { FLAG_H } else { 0 }
            | if value == 0x7f { FLAG_PV } else { 0 };
        result
    }
    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.f = (self.f & FLAG_C)
            | sz_flags(result)
            | FLAG_N
            | if value & 0x0f == 0 { FLAG_H } else { 0 }
            | if value == 0x80 { FLAG_PV } else { 0 };
        result
    }
    fn add16(&mut self, lhs: u16, rhs: u16) -> u16 {
        let wide = lhs as u32 + rhs as u32;
        let result = wide as u16;
        let half = ((lhs ^ rhs ^ result) >> 8) as u8 & FLAG_H;
        self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV))
            | ((result >> 8) as u8 & (FLAG_X | FLAG_Y))
            | half
            | if wide > 0xffff { FLAG_C } else { 0 };
        result
    }

    /// Executes one of the accumulator/flag opcodes in the `x = 0, z = 7` column.
    fn accumulator_op(&mut self, y: u8) {
        let kept = self.f & (FLAG_S | FLAG_Z | FLAG_PV);
        match y {
            0 /* RLCA */ => {
                self.a = self.a.rotate_left(1);
                self.f = kept | (self.a & (FLAG_X | FLAG_Y)) | (self.a & FLAG_C);
            }
            1 /* RRCA */ => {
                let carry = self.a & 1;
                self.a = self.a.rotate_right(1);
                self.f = kept | (self.a & (FLAG_X | FLAG_Y)) | carry;
            }
            2 /* RLA */ => {
                let carry = self.a >> 7;
                self.a = (self.a << 1) | (self.f & FLAG_C);
                self.f = kept | (self.a & (FLAG_X | FLAG_Y)) | carry;
            }
            3 /* RRA */ => {
                let carry = self.a & 1;
                self.a = (self.a >> 1) | ((self.f & FLAG_C) << 7);
                self.f = kept | (self.a & (FLAG_X | FLAG_Y)) | carry;
            }
            4 /* DAA */ => self.decimal_adjust(),
            5 /* CPL */ => {
                self.a = !self.a;
                self.f = (self.f & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C))
                    | FLAG_H
                    | FLAG_N
                    | (self.a & (FLAG_X | FLAG_Y));
            }
            6 /* SCF */ => {
                self.f = kept | FLAG_C | (self.a & (FLAG_X | FLAG_Y));
            }
            _ /* CCF */ => {
                let carry = self.flag(FLAG_C);
                self.f = kept
                    | if carry { FLAG_H } else { FLAG_C }
                    | (self.a & (FLAG_X | FLAG_Y));
            }
        }
    }
    fn decimal_adjust(&mut self) {
        let a = self.a;
        let subtract = self.flag(FLAG_N);
        let mut correction = 0;
        let mut carry = self.flag(FLAG_C);
        if self.flag(FLAG_H) || a & 0x0f > 9 {
            correction |= 0x06;
        }
        if carry || a > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        let (result, half) = if subtract {
            (a.wrapping_sub(correction), self.flag(FLAG_H) && a & 0x0f < 6)
        } else {
            (a.wrapping_add(correction), a & 0x0f > 9)
        };
        self.a = result;
        self.f = szp_flags(result)
            | (self.f & FLAG_N)
            | if half { FLAG_H } else { 0 }
            | if carry { FLAG_C } else { 0 };
    }

    fn exchange_af(&mut self) {
        let current = bits::join(self.a, self.f);
        (self.a, self.f) = bits::split(self.alternate[0]);
        self.alternate[0] = current;
    }
    fn exchange_all(&mut self) {
        for pair in 0..3 {
            let current = self.read_rp(pair as u8);
            self.write_rp(pair as u8, self.alternate[pair + 1]);
            self.alternate[pair + 1] = current;
        }
    }
}

impl<M: Memory> Cpu for Z80<M> {
    fn step(&mut self, io: &mut dyn PortIo) -> Result<(), ExecutionError> {
        let address = self.pc;
        let operation = self.fetch_u8();
        let opcode = Opcode::from(operation);
        let (y, z, p, q) = (opcode.y(), opcode.z(), opcode.p(), opcode.q());
        // shortcut for the prefix groups
        let unimpl = Err(ExecutionError::Unimplemented {
            opcode: operation,
            address,
        });
        match opcode.x() {
            0 => match z {
                0 => match y {
                    0 /* NOP */ => {}
                    1 /* EX AF,AF' */ => self.exchange_af(),
                    2 /* DJNZ d */ => {
                        let displacement = self.fetch_u8();
                        self.b = self.b.wrapping_sub(1);
                        if self.b != 0 {
                            self.pc = bits::displace(self.pc, displacement);
                        }
                    }
                    3 /* JR d */ => {
                        let displacement = self.fetch_u8();
                        self.pc = bits::displace(self.pc, displacement);
                    }
                    _ /* JR cc,d */ => {
                        let displacement = self.fetch_u8();
                        if self.condition(Condition::from(y - 4)) {
                            self.pc = bits::displace(self.pc, displacement);
                        }
                    }
                },
                1 => {
                    if q /* ADD HL,rp */ {
                        let value = self.add16(self.hl(), self.read_rp(p));
                        self.set_hl(value);
                    } else /* LD rp,nn */ {
                        let value = self.fetch_u16();
                        self.write_rp(p, value);
                    }
                }
                2 => match (q, p) {
                    (false, 0) /* LD (BC),A */ => self.memory.store_u8(self.read_rp(0), self.a),
                    (false, 1) /* LD (DE),A */ => self.memory.store_u8(self.read_rp(1), self.a),
                    (false, 2) /* LD (nn),HL */ => {
                        let target = self.fetch_u16();
                        self.memory.store_u16(target, self.hl());
                    }
                    (false, _) /* LD (nn),A */ => {
                        let target = self.fetch_u16();
                        self.memory.store_u8(target, self.a);
                    }
                    (true, 0) /* LD A,(BC) */ => self.a = self.memory.load_u8(self.read_rp(0)),
                    (true, 1) /* LD A,(DE) */ => self.a = self.memory.load_u8(self.read_rp(1)),
                    (true, 2) /* LD HL,(nn) */ => {
                        let source = self.fetch_u16();
                        let value = self.memory.load_u16(source);
                        self.set_hl(value);
                    }
                    (true, _) /* LD A,(nn) */ => {
                        let source = self.fetch_u16();
                        self.a = self.memory.load_u8(source);
                    }
                },
                3 /* INC rp / DEC rp */ => {
                    let value = self.read_rp(p);
                    let value = if q {
                        value.wrapping_sub(1)
                    } else {
                        value.wrapping_add(1)
                    };
                    self.write_rp(p, value);
                }
                4 /* INC r */ => {
                    let value = self.inc8(self.read_r(y));
                    self.write_r(y, value);
                }
                5 /* DEC r */ => {
                    let value = self.dec8(self.read_r(y));
                    self.write_r(y, value);
                }
                6 /* LD r,n */ => {
                    let value = self.fetch_u8();
                    self.write_r(y, value);
                }
                _ => self.accumulator_op(y),
            },
            1 => {
                if y == 6 && z == 6 {
                    // HALT: idle on this opcode, nothing models the interrupt that would end it
                    self.pc = address;
                } else /* LD r,r' */ {
                    self.write_r(y, self.read_r(z));
                }
            }
            2 /* ALU A,r */ => self.alu(AluOp::from(y), self.read_r(z)),
            _ => match z {
                0 /* RET cc */ => {
                    if self.condition(Condition::from(y)) {
                        self.pc = self.pop();
                    }
                }
                1 => match (q, p) {
                    (false, _) /* POP rp2 */ => {
                        let value = self.pop();
                        self.write_rp2(p, value);
                    }
                    (true, 0) /* RET */ => self.pc = self.pop(),
                    (true, 1) /* EXX */ => self.exchange_all(),
                    (true, 2) /* JP (HL) */ => self.pc = self.hl(),
                    (true, _) /* LD SP,HL */ => self.sp = self.hl(),
                },
                2 /* JP cc,nn */ => {
                    let target = self.fetch_u16();
                    if self.condition(Condition::from(y)) {
                        self.pc = target;
                    }
                }
                3 => match y {
                    0 /* JP nn */ => self.pc = self.fetch_u16(),
                    1 /* CB prefix */ => return unimpl,
                    2 /* OUT (n),A */ => {
                        let port = bits::join(self.a, self.fetch_u8());
                        io.port_out(port, self.a);
                    }
                    3 /* IN A,(n) */ => {
                        let port = bits::join(self.a, self.fetch_u8());
                        self.a = io.port_in(port, &*self);
                    }
                    4 /* EX (SP),HL */ => {
                        let value = self.memory.load_u16(self.sp);
                        self.memory.store_u16(self.sp, self.hl());
                        self.set_hl(value);
                    }
                    5 /* EX DE,HL */ => {
                        let de = self.read_rp(1);
                        self.write_rp(1, self.hl());
                        self.set_hl(de);
                    }
                    6 /* DI */ => self.iff1 = false,
                    _ /* EI */ => self.iff1 = true,
                },
                4 /* CALL cc,nn */ => {
                    let target = self.fetch_u16();
                    if self.condition(Condition::from(y)) {
                        self.push(self.pc);
                        self.pc = target;
                    }
                }
                5 => match (q, p) {
                    (false, _) /* PUSH rp2 */ => self.push(self.read_rp2(p)),
                    (true, 0) /* CALL nn */ => {
                        let target = self.fetch_u16();
                        self.push(self.pc);
                        self.pc = target;
                    }
                    (true, _) /* DD, ED, FD prefixes */ => return unimpl,
                },
                6 /* ALU A,n */ => {
                    let value = self.fetch_u8();
                    self.alu(AluOp::from(y), value);
                }
                _ /* RST */ => {
                    self.push(self.pc);
                    self.pc = y as u16 * 8;
                }
            },
        }
        Ok(())
    }

    fn pc(&self) -> u16 {
        self.pc
    }
    fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    fn register(&self, register: Register) -> u8 {
        match register {
            Register::A => self.a,
            Register::F => self.f,
            Register::B => self.b,
            Register::C => self.c,
            Register::D => self.d,
            Register::E => self.e,
            Register::H => self.h,
            Register::L => self.l,
        }
    }
    fn register_pair(&self, pair: RegisterPair) -> u16 {
        match pair {
            RegisterPair::AF => bits::join(self.a, self.f),
            RegisterPair::BC => self.read_rp(0),
            RegisterPair::DE => self.read_rp(1),
            RegisterPair::HL => self.hl(),
            RegisterPair::SP => self.sp,
        }
    }

    fn memory(&self) -> &dyn Memory {
        &self.memory
    }
    fn memory_mut(&mut self) -> &mut dyn Memory {
        &mut self.memory
    }
}
