//! Safe, best-effort access to kernel memory.
//!
//! Reads go through an externally-provided primitive and can fail when the
//! target address or the assumed structure layout is not valid on the
//! running kernel. Callers decide per read whether a failure aborts the
//! remaining work or degrades to a default value; the error type below is
//! kept separate from the hook-level abort errors so the two tiers don't
//! mix.

use thiserror::Error;

/// A structured read from kernel memory failed.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("invalid read of {size} bytes at {addr:#x}")]
pub struct ReadError {
    pub addr: u64,
    pub size: usize,
}

/// Reads raw bytes out of kernel memory. Implementations must not fault on
/// invalid addresses; they report [`ReadError`] instead.
pub trait KernelReader: Send + Sync {
    fn read(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadError>;

    fn read_u8(&self, addr: u64) -> Result<u8, ReadError> {
        let mut bytes = [0; 1];
        self.read(addr, &mut bytes)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, addr: u64) -> Result<u16, ReadError> {
        let mut bytes = [0; 2];
        self.read(addr, &mut bytes)?;
        Ok(u16::from_ne_bytes(bytes))
    }

    fn read_u32(&self, addr: u64) -> Result<u32, ReadError> {
        let mut bytes = [0; 4];
        self.read(addr, &mut bytes)?;
        Ok(u32::from_ne_bytes(bytes))
    }

    fn read_u64(&self, addr: u64) -> Result<u64, ReadError> {
        let mut bytes = [0; 8];
        self.read(addr, &mut bytes)?;
        Ok(u64::from_ne_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Byte-addressed fake memory; any byte not explicitly stored makes the
    /// read fail.
    #[derive(Default)]
    struct TestMemory(HashMap<u64, u8>);

    impl KernelReader for TestMemory {
        fn read(&self, addr: u64, dst: &mut [u8]) -> Result<(), ReadError> {
            let size = dst.len();
            for (i, byte) in dst.iter_mut().enumerate() {
                *byte = *self.0.get(&(addr + i as u64)).ok_or(ReadError {
                    addr,
                    size,
                })?;
            }
            Ok(())
        }
    }

    #[test]
    fn typed_reads() {
        let mut mem = TestMemory::default();
        for (i, byte) in 0xdeadbeefu32.to_ne_bytes().iter().enumerate() {
            mem.0.insert(0x1000 + i as u64, *byte);
        }

        assert_eq!(mem.read_u32(0x1000), Ok(0xdeadbeef));
        assert_eq!(
            mem.read_u32(0x2000),
            Err(ReadError {
                addr: 0x2000,
                size: 4
            })
        );
        // A partially mapped value does not read.
        assert!(mem.read_u64(0x1000).is_err());
    }
}
