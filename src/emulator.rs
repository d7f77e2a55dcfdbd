//! Speculative emulation interface and the session-wide availability gate.

use crate::{Address, Architecture};

/// An emulator seeded from the live processor state.
///
/// The window builder steps it alongside the instructions it resolves so
/// that branch outcomes reflect real register values.
pub trait Emulator {
    /// Program counter of the next instruction the emulator would execute.
    fn pc(&self) -> Address;

    /// Execute exactly one instruction. Returns false if it faulted.
    fn single_step(&mut self) -> bool;

    fn last_step_succeeded(&self) -> bool;

    /// False once the emulator's state can no longer be trusted.
    fn is_valid(&self) -> bool;

    /// Mark the state untrustworthy; later steps are refused.
    fn invalidate(&mut self);

    /// Thumb bit of the emulated state, if the architecture has one.
    fn read_mode_bit(&self) -> Option<bool>;
}

/// Errors that can occur while constructing an emulator
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    #[error("Emulation is not supported for {0}")]
    Unsupported(Architecture),

    /// The debuggee lacks memory the emulator must map.
    #[error("Memory at address {0:#x} unavailable")]
    MemoryUnavailable(Address),

    #[error("Emulator construction failed: {0}")]
    Failed(String),
}

/// Checks whether the host can give an emulator the memory it needs.
pub trait ResourceProbe {
    fn executable_memory_available(&self) -> bool;
}

/// Probes by mapping (and immediately unmapping) an anonymous RWX region.
#[derive(Debug, Clone, Copy)]
pub struct MmapProbe {
    size: usize,
}

/// Emulators reserve a 1 GiB translation cache up front.
pub const DEFAULT_PROBE_SIZE: usize = 1024 * 1024 * 1024;

impl MmapProbe {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Default for MmapProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_SIZE)
    }
}

impl ResourceProbe for MmapProbe {
    #[cfg(unix)]
    fn executable_memory_available(&self) -> bool {
        // macOS refuses writable+executable anonymous maps outright.
        let prot = if cfg!(target_os = "macos") {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        };

        // SAFETY: anonymous private mapping that is never dereferenced and is
        // unmapped before returning.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                self.size,
                prot,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            log::debug!(
                "mmap({} bytes) failed: {}",
                self.size,
                std::io::Error::last_os_error()
            );
            return false;
        }

        // SAFETY: `ptr` and `size` are exactly what mmap returned above.
        unsafe {
            libc::munmap(ptr, self.size);
        }
        true
    }

    #[cfg(not(unix))]
    fn executable_memory_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Unprobed,
    Available,
    Disabled,
}

/// Runs the resource probe once per session and remembers the answer.
pub struct EmulationGate {
    state: ProbeState,
    probe: Box<dyn ResourceProbe>,
}

impl EmulationGate {
    pub fn new() -> Self {
        Self::with_probe(Box::new(MmapProbe::default()))
    }

    pub fn with_probe(probe: Box<dyn ResourceProbe>) -> Self {
        Self {
            state: ProbeState::Unprobed,
            probe,
        }
    }

    /// Whether emulation may be used. The first call runs the probe; a
    /// failure disables emulation for the rest of the session.
    pub fn check(&mut self) -> bool {
        match self.state {
            ProbeState::Available => true,
            ProbeState::Disabled => false,
            ProbeState::Unprobed => {
                if self.probe.executable_memory_available() {
                    self.state = ProbeState::Available;
                    true
                } else {
                    log::error!(
                        "Disabling emulation for branch prediction: mapping {} MiB of \
                         executable memory failed. Free some memory or turn emulation off.",
                        DEFAULT_PROBE_SIZE >> 20
                    );
                    self.state = ProbeState::Disabled;
                    false
                }
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.state == ProbeState::Disabled
    }
}

impl Default for EmulationGate {
    fn default() -> Self {
        Self::new()
    }
}
