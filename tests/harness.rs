use std::io::Write;

use proptest::prelude::*;
use zex_harness::{
    Cpu, Driver, ExecutionError, FlatMemory, LOAD_ORIGIN, Memory, PortIo, Register, RegisterPair,
    RunError, Z80, load_image, loader::MAX_IMAGE_LEN, run_file,
};

/// A stand-in CPU that performs a scripted port access on given steps.
struct ScriptedCpu {
    memory: FlatMemory,
    pc: u16,
    steps: u64,
    print_on: u64,
    halt_on: u64,
}
impl ScriptedCpu {
    fn new(print_on: u64, halt_on: u64) -> Self {
        Self {
            memory: FlatMemory::new(),
            pc: 0,
            steps: 0,
            print_on,
            halt_on,
        }
    }
}
impl Cpu for ScriptedCpu {
    fn step(&mut self, io: &mut dyn PortIo) -> Result<(), ExecutionError> {
        self.steps += 1;
        self.pc = self.pc.wrapping_add(1);
        if self.steps == self.print_on {
            io.port_in(0, &*self);
        }
        if self.steps == self.halt_on {
            io.port_out(0, 0);
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
            Register::C => 2,
            Register::E => b'Z',
            _ => 0,
        }
    }
    fn register_pair(&self, pair: RegisterPair) -> u16 {
        match pair {
            RegisterPair::DE => b'Z' as u16,
            _ => 0,
        }
    }
    fn memory(&self) -> &dyn Memory {
        &self.memory
    }
    fn memory_mut(&mut self) -> &mut dyn Memory {
        &mut self.memory
    }
}

#[test]
fn driver_accepts_any_cpu() {
    let mut driver = Driver::new(ScriptedCpu::new(2, 5), Vec::new());
    driver.load(&[0x00]).unwrap();
    assert_eq!(driver.cpu().pc(), LOAD_ORIGIN);
    assert_eq!(driver.run().unwrap(), 5);
    assert_eq!(driver.cpu().read_memory(0x0005, 3), vec![0xdb, 0x00, 0xc9]);
    assert_eq!(driver.into_console(), b"Z");
}

#[test]
fn halt_on_the_first_instruction_counts_one() {
    let mut driver = Driver::new(ScriptedCpu::new(0, 1), Vec::new());
    assert_eq!(driver.run().unwrap(), 1);
}

#[test]
fn runs_an_image_from_disk() {
    // LD C,9 ; LD DE,0x0109 ; CALL 5 ; RST 0 ; "ZEX ok\r\n$"
    let mut image = vec![0x0e, 0x09, 0x11, 0x09, 0x01, 0xcd, 0x05, 0x00, 0xc7];
    image.extend_from_slice(b"ZEX ok\r\n$");
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&image).unwrap();

    let mut console = Vec::new();
    let report = run_file(file.path(), &mut console, 2).unwrap();
    assert_eq!(console, b"ZEX ok\r\n");
    // LD, LD, CALL, IN, RET, RST, OUT
    assert_eq!(report.instructions, 7);
    assert_eq!(report.emulated_seconds(), 3.5);
}

#[test]
fn missing_image_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let error = run_file(&dir.path().join("absent.com"), Vec::new(), 1).unwrap_err();
    assert!(matches!(error, RunError::Load(_)));
}

proptest! {
    #[test]
    fn loaded_image_reads_back_verbatim(image in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let mut cpu = Z80::new(FlatMemory::new());
        load_image(&mut cpu, &image).unwrap();
        prop_assert_eq!(cpu.read_memory(LOAD_ORIGIN, image.len()), image);
        prop_assert_eq!(cpu.pc(), LOAD_ORIGIN);
    }

    #[test]
    fn traps_overwrite_whatever_was_there(low_page in proptest::array::uniform8(any::<u8>()), fill in any::<u8>()) {
        let mut cpu = Z80::new(FlatMemory::new());
        for (address, byte) in low_page.into_iter().enumerate() {
            cpu.write_memory(address as u16, byte);
        }
        load_image(&mut cpu, &[fill; 16]).unwrap();
        let patched = cpu.read_memory(0x0000, 8);
        prop_assert_eq!(&patched[0..2], &[0xd3, 0x00]);
        prop_assert_eq!(&patched[5..8], &[0xdb, 0x00, 0xc9]);
        // the bytes between the traps are left alone
        prop_assert_eq!(&patched[2..5], &low_page[2..5]);
    }

    #[test]
    fn image_length_decides_acceptance(extra in 0usize..64) {
        let mut cpu = Z80::new(FlatMemory::new());
        let fits = load_image(&mut cpu, &vec![0; MAX_IMAGE_LEN - extra]).is_ok();
        let overflows = load_image(&mut cpu, &vec![0; MAX_IMAGE_LEN + 1 + extra]).is_err();
        prop_assert!(fits && overflows);
    }
}
