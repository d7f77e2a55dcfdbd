//! Keeps the caches coherent with the debuggee across debugger events.
//!
//! The debugger runtime delivers events however it likes (callbacks, a
//! polling loop after each command); it only has to forward each one to
//! [`CacheInvalidator::handle`] before the next window is built.

use std::fmt;

use crate::cache::DisasmCaches;
use crate::decoder::Decoder;
use crate::target::Registers;
use crate::{Address, Architecture};

/// Notifications from the debugger runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebuggerEvent {
    /// The debuggee halted (breakpoint, step, signal, ...)
    Stop,
    /// The user or a script wrote debuggee memory
    MemoryChanged,
    /// The user or a script wrote a register
    RegisterChanged,
    /// A new object file was loaded
    NewObjfile,
}

impl fmt::Display for DebuggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DebuggerEvent::Stop => write!(f, "stop"),
            DebuggerEvent::MemoryChanged => write!(f, "memory-changed"),
            DebuggerEvent::RegisterChanged => write!(f, "register-changed"),
            DebuggerEvent::NewObjfile => write!(f, "new-objfile"),
        }
    }
}

/// Applies invalidation rules to a set of caches.
pub struct CacheInvalidator<'a, D: Decoder + ?Sized> {
    caches: &'a mut DisasmCaches,
    decoder: &'a D,
    arch: Architecture,
}

impl<'a, D: Decoder + ?Sized> CacheInvalidator<'a, D> {
    pub fn new(caches: &'a mut DisasmCaches, decoder: &'a D, arch: Architecture) -> Self {
        Self {
            caches,
            decoder,
            arch,
        }
    }

    pub fn handle<R: Registers + ?Sized>(&mut self, event: DebuggerEvent, registers: &R) {
        match event {
            DebuggerEvent::Stop => self.on_stop(registers),
            DebuggerEvent::MemoryChanged | DebuggerEvent::RegisterChanged => {
                // The write may have moved the pc; read it fresh.
                registers.clear_register_cache();
                self.on_state_changed(registers.pc(self.arch), event)
            }
            DebuggerEvent::NewObjfile => {
                log::debug!("new object file, dropping decoder handles");
                self.decoder.reset();
            }
        }
    }

    /// A stop at an address the last window predicted keeps the cache; any
    /// other stop clears it.
    fn on_stop<R: Registers + ?Sized>(&mut self, registers: &R) {
        registers.clear_register_cache();

        match registers.pc(self.arch) {
            Some(pc) if self.caches.frontier.contains(pc) => {
                log::trace!("stopped at predicted {pc:#x}, keeping instruction cache");
            }
            pc => {
                log::debug!(
                    "stopped at unpredicted {}, clearing {} cached instructions",
                    pc.map_or_else(|| "<unknown pc>".to_string(), |pc| format!("{pc:#x}")),
                    self.caches.computed.len()
                );
                self.caches.computed.clear();
            }
        }
    }

    fn on_state_changed(&mut self, pc: Option<Address>, event: DebuggerEvent) {
        let stale: Vec<Address> = pc.into_iter().chain(self.caches.frontier.iter()).collect();
        log::trace!("{event}: evicting {} cached instructions", stale.len());

        for address in stale {
            self.caches.computed.remove(address);
        }
        self.caches.frontier.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::CachedRegisters;
    use crate::testing::{insn, ToyDecoder, ToyTarget};
    use crate::{InsnGroups, Instruction};

    fn cached(caches: &mut DisasmCaches, address: Address) {
        let i = insn(address, 4, "nop", "", InsnGroups::default(), None);
        caches.computed.insert(address, Instruction::from_insn(i));
    }

    fn setup(pc: Address) -> (DisasmCaches, ToyDecoder, ToyTarget) {
        let mut caches = DisasmCaches::new();
        for address in [0x1000, 0x1004, 0x1008, 0x3000] {
            cached(&mut caches, address);
        }
        caches.frontier.reset(Some(0x1004));
        caches.frontier.add(0x1008);

        let mut target = ToyTarget::new();
        target.set_register("pc", pc);
        (caches, ToyDecoder::new(), target)
    }

    #[test]
    fn test_stop_at_predicted_address_keeps_cache() {
        let (mut caches, decoder, target) = setup(0x1004);
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::Stop, &target);

        assert_eq!(caches.computed.len(), 4);
        assert_eq!(target.register_cache_clears(), 1);
    }

    #[test]
    fn test_stop_elsewhere_clears_cache() {
        let (mut caches, decoder, target) = setup(0x5000);
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::Stop, &target);

        assert!(caches.computed.is_empty());
        assert_eq!(target.register_cache_clears(), 1);
    }

    #[test]
    fn test_stop_without_pc_clears_cache() {
        let (mut caches, decoder, _) = setup(0x1004);
        let target = ToyTarget::new();
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::Stop, &target);

        assert!(caches.computed.is_empty());
    }

    #[test]
    fn test_register_change_evicts_pc_and_frontier() {
        let (mut caches, decoder, target) = setup(0x1000);
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::RegisterChanged, &target);

        assert!(!caches.computed.contains(0x1000));
        assert!(!caches.computed.contains(0x1004));
        assert!(!caches.computed.contains(0x1008));
        assert!(caches.computed.contains(0x3000));
        assert!(caches.frontier.is_empty());
    }

    #[test]
    fn test_register_change_reads_pc_written_by_user() {
        let (mut caches, decoder, target) = setup(0x1000);
        let mut registers = CachedRegisters::new(target);
        assert_eq!(registers.pc(Architecture::AArch64), Some(0x1000));

        registers.inner_mut().set_register("pc", 0x3000);
        caches.frontier.clear();
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::RegisterChanged, &registers);

        assert!(!caches.computed.contains(0x3000));
        assert!(caches.computed.contains(0x1000));
        assert_eq!(registers.inner().register_cache_clears(), 1);
    }

    #[test]
    fn test_memory_change_same_as_register_change() {
        let (mut caches, decoder, target) = setup(0x3000);
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::MemoryChanged, &target);

        assert_eq!(caches.computed.addresses().collect::<Vec<_>>(), vec![0x1000]);
        assert!(caches.frontier.is_empty());
    }

    #[test]
    fn test_new_objfile_resets_decoder() {
        let (mut caches, decoder, target) = setup(0x1000);
        CacheInvalidator::new(&mut caches, &decoder, Architecture::AArch64)
            .handle(DebuggerEvent::NewObjfile, &target);

        assert_eq!(decoder.resets(), 1);
        assert_eq!(caches.computed.len(), 4);
    }
}
