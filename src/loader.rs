//! Places a CP/M `.com` image in memory and patches the BDOS traps around it.

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{exec::Cpu, mem::ADDRESS_SPACE};

/// Where CP/M loads a transient program, and where execution begins.
pub const LOAD_ORIGIN: u16 = 0x0100;
/// The largest image that fits between [`LOAD_ORIGIN`] and the top of memory.
pub const MAX_IMAGE_LEN: usize = ADDRESS_SPACE - LOAD_ORIGIN as usize;

/// The warm-boot vector, patched with `OUT (0),A`.
pub const HALT_TRAP: u16 = 0x0000;
/// The BDOS entry point, patched with `IN A,(0)` and `RET`.
pub const BDOS_TRAP: u16 = 0x0005;

const HALT_TRAP_CODE: [u8; 2] = [0xd3, 0x00];
const BDOS_TRAP_CODE: [u8; 3] = [0xdb, 0x00, 0xc9];

/// Represents a failure to load a program image.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("couldn't read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("image is {len} bytes, at most {} fit above 0x0100", MAX_IMAGE_LEN)]
    TooLarge { len: usize },
}

/// Reads a program image from disk.
pub fn read_image(path: impl AsRef<Path>) -> Result<Vec<u8>, LoadError> {
    let path = path.as_ref();
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Copies `image` to [`LOAD_ORIGIN`], patches both traps and points the program counter at
/// the first byte of the image.
///
/// The traps are written after the image, so they win over anything the image put there.
/// Nothing is written if the image doesn't fit.
pub fn load_image(cpu: &mut dyn Cpu, image: &[u8]) -> Result<(), LoadError> {
    if image.len() > MAX_IMAGE_LEN {
        return Err(LoadError::TooLarge { len: image.len() });
    }
    for (offset, byte) in image.iter().enumerate() {
        cpu.write_memory(LOAD_ORIGIN + offset as u16, *byte);
    }
    patch_traps(cpu);
    cpu.set_pc(LOAD_ORIGIN);
    tracing::debug!(
        len = image.len(),
        pc = LOAD_ORIGIN,
        "image loaded and traps patched"
    );
    Ok(())
}

/// Writes the halt trap at the warm-boot vector and the system-call trap at the BDOS entry.
pub fn patch_traps(cpu: &mut dyn Cpu) {
    for (offset, byte) in HALT_TRAP_CODE.into_iter().enumerate() {
        cpu.write_memory(HALT_TRAP + offset as u16, byte);
    }
    for (offset, byte) in BDOS_TRAP_CODE.into_iter().enumerate() {
        cpu.write_memory(BDOS_TRAP + offset as u16, byte);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::{mem::FlatMemory, z80::Z80};

    #[test]
    fn image_lands_at_origin_and_pc_follows() {
        let mut cpu = Z80::new(FlatMemory::new());
        load_image(&mut cpu, &[0x3e, 0x01, 0xc3, 0x00, 0x00]).unwrap();
        assert_eq!(cpu.pc(), LOAD_ORIGIN);
        assert_eq!(cpu.read_memory(LOAD_ORIGIN, 5), vec![0x3e, 0x01, 0xc3, 0x00, 0x00]);
        assert_eq!(cpu.read_memory(LOAD_ORIGIN + 5, 1), vec![0x00]);
    }

    #[test]
    fn traps_are_patched_for_an_empty_image() {
        let mut cpu = Z80::new(FlatMemory::new());
        load_image(&mut cpu, &[]).unwrap();
        assert_eq!(cpu.read_memory(0x0000, 8), vec![0xd3, 0x00, 0, 0, 0, 0xdb, 0x00, 0xc9]);
        assert_eq!(cpu.pc(), LOAD_ORIGIN);
    }

    #[test]
    fn largest_image_fills_memory() {
        let mut cpu = Z80::new(FlatMemory::new());
        let image = vec![0xaa; MAX_IMAGE_LEN];
        load_image(&mut cpu, &image).unwrap();
        assert_eq!(cpu.read_memory(0xffff, 1), vec![0xaa]);
        // nothing wrapped around onto the patched page
        assert_eq!(cpu.read_memory(0x0000, 2), vec![0xd3, 0x00]);
    }

    #[test]
    fn oversized_image_is_rejected_untouched() {
        let mut cpu = Z80::new(FlatMemory::new());
        let image = vec![0xaa; MAX_IMAGE_LEN + 1];
        let error = load_image(&mut cpu, &image).unwrap_err();
        assert!(matches!(error, LoadError::TooLarge { len } if len == MAX_IMAGE_LEN + 1));
        assert_eq!(cpu.read_memory(0x0000, 1), vec![0x00]);
        assert_eq!(cpu.read_memory(LOAD_ORIGIN, 1), vec![0x00]);
        assert_eq!(cpu.pc(), 0);
    }

    #[test]
    fn reads_image_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0xc3, 0x00, 0x00]).unwrap();
        assert_eq!(read_image(file.path()).unwrap(), vec![0xc3, 0x00, 0x00]);
    }

    #[test]
    fn missing_image_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zexdoc.com");
        let error = read_image(&path).unwrap_err();
        assert!(error.to_string().contains("zexdoc.com"));
        assert!(matches!(error, LoadError::Io { ref source, .. } if source.kind() == io::ErrorKind::NotFound));
    }
}
