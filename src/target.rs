//! Access to the debuggee: memory, registers and emulator construction.
//!
//! The debugger runtime implements these traits; everything in this crate
//! only reads through them.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::emulator::{Emulator, EmulatorError};
use crate::{Address, Architecture};

/// Debuggee memory
pub trait Memory {
    /// Read `len` bytes at `address`.
    ///
    /// With `partial` set, a read that runs into unmapped memory returns the
    /// readable prefix instead of failing. Returns None if not even the
    /// first byte is readable.
    fn read(&self, address: Address, len: usize, partial: bool) -> Option<Vec<u8>>;

    /// True if the byte at `address` can be read.
    fn is_readable(&self, address: Address) -> bool {
        self.read(address, 1, false).is_some()
    }
}

/// Debuggee registers
pub trait Registers {
    fn read_register(&self, name: &str) -> Option<u64>;

    /// Drop any memoised register values. No-op for uncached sources.
    fn clear_register_cache(&self) {}

    /// Current program counter.
    fn pc(&self, arch: Architecture) -> Option<Address> {
        self.read_register(arch.pc_register())
    }
}

/// A stopped debuggee: memory, registers, and the means to emulate from its
/// current state.
pub trait Target: Memory + Registers {
    /// Build an emulator seeded with the live register and memory state.
    fn create_emulator(&self, arch: Architecture) -> Result<Box<dyn Emulator>, EmulatorError> {
        Err(EmulatorError::Unsupported(arch))
    }
}

/// Memoises register reads until the next stop.
///
/// Reading registers from a live process is a round trip to the debugger;
/// within one stop they cannot change unless the user writes them, which the
/// runtime reports as a register-changed event.
#[derive(Debug)]
pub struct CachedRegisters<T> {
    inner: T,
    values: RefCell<HashMap<String, u64>>,
}

impl<T> CachedRegisters<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            values: RefCell::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Mutable access to the wrapped target. Cached values are kept.
    pub fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn cached_count(&self) -> usize {
        self.values.borrow().len()
    }
}

impl<T: Registers> Registers for CachedRegisters<T> {
    fn read_register(&self, name: &str) -> Option<u64> {
        if let Some(value) = self.values.borrow().get(name) {
            return Some(*value);
        }
        let value = self.inner.read_register(name)?;
        self.values.borrow_mut().insert(name.to_string(), value);
        Some(value)
    }

    fn clear_register_cache(&self) {
        self.values.borrow_mut().clear();
        self.inner.clear_register_cache();
    }
}

impl<T: Memory> Memory for CachedRegisters<T> {
    fn read(&self, address: Address, len: usize, partial: bool) -> Option<Vec<u8>> {
        self.inner.read(address, len, partial)
    }

    fn is_readable(&self, address: Address) -> bool {
        self.inner.is_readable(address)
    }
}

impl<T: Target> Target for CachedRegisters<T> {
    fn create_emulator(&self, arch: Architecture) -> Result<Box<dyn Emulator>, EmulatorError> {
        self.inner.create_emulator(arch)
    }
}
