//! Single-instruction resolution: fetch, decode, enhance and cache one
//! instruction at a time.

use crate::cache::DisasmCaches;
use crate::config::Settings;
use crate::decoder::Decoder;
use crate::emulator::{EmulationGate, Emulator};
use crate::enhance::Enhancer;
use crate::invalidate::{CacheInvalidator, DebuggerEvent};
use crate::target::{Memory, Registers, Target};
use crate::{Address, Architecture, Endian, Instruction, IsaMode};

/// How a single resolution interacts with enhancement and the caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Attach control-flow metadata (and step the emulator if supplied)
    pub enhance: bool,
    /// Answer from the computed-instruction cache when possible
    pub from_cache: bool,
    /// Store the result in the computed-instruction cache
    pub put_cache: bool,
    /// Record the result as the predecessor of its `next`
    pub put_backward_cache: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            enhance: true,
            from_cache: false,
            put_cache: false,
            put_backward_cache: true,
        }
    }
}

impl ResolveOptions {
    /// Enhanced and stored in the computed-instruction cache.
    pub fn cached() -> Self {
        Self {
            put_cache: true,
            ..Self::default()
        }
    }
}

/// Disassembly context for one debugging session.
///
/// Owns the decoder, the caches and the emulation gate. Every method that
/// looks at the debuggee takes it as a parameter, so one context can be
/// used across stops without holding a borrow of the debugger.
pub struct Disassembler<D: Decoder> {
    arch: Architecture,
    endian: Endian,
    decoder: D,
    enhancer: Enhancer,
    pub(crate) caches: DisasmCaches,
    pub(crate) gate: EmulationGate,
    pub(crate) settings: Settings,
}

impl<D: Decoder> Disassembler<D> {
    pub fn new(arch: Architecture, endian: Endian, decoder: D) -> Self {
        Self {
            arch,
            endian,
            decoder,
            enhancer: Enhancer::for_architecture(arch),
            caches: DisasmCaches::new(),
            gate: EmulationGate::new(),
            settings: Settings::default(),
        }
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the host resource check run before the first emulation.
    pub fn with_gate(mut self, gate: EmulationGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn caches(&self) -> &DisasmCaches {
        &self.caches
    }

    pub fn caches_mut(&mut self) -> &mut DisasmCaches {
        &mut self.caches
    }

    pub fn invalidator(&mut self) -> CacheInvalidator<'_, D> {
        CacheInvalidator::new(&mut self.caches, &self.decoder, self.arch)
    }

    /// Forward a debugger notification to the invalidation rules.
    pub fn handle_event<R: Registers + ?Sized>(&mut self, event: DebuggerEvent, registers: &R) {
        self.invalidator().handle(event, registers);
    }

    /// Encoding to decode `address` with.
    ///
    /// A mode observed during emulation wins; otherwise the live mode
    /// register decides, and without one the native encoding is used.
    pub fn isa_mode_at<R: Registers + ?Sized>(&self, registers: &R, address: Address) -> IsaMode {
        let Some(reg) = self.arch.mode_register() else {
            return IsaMode::Native;
        };
        if let Some(thumb) = self.caches.mode.bit(address) {
            return IsaMode::from_thumb_bit(thumb);
        }
        registers
            .read_register(reg.name)
            .map_or(IsaMode::Native, |value| IsaMode::from_thumb_bit(reg.bit_set(value)))
    }

    /// Resolve the instruction at `address`.
    ///
    /// Returns None when the address is unreadable or does not decode. The
    /// emulator, if any, is stepped at most once and only when it sits at
    /// `address`.
    pub fn resolve<T: Target + ?Sized>(
        &mut self,
        target: &T,
        address: Address,
        emu: Option<&mut (dyn Emulator + '_)>,
        options: ResolveOptions,
    ) -> Option<Instruction> {
        let ins = match self.computed(address, options.from_cache) {
            Some(hit) => hit,
            None => {
                let ins = self.decode_at(target, address, emu, options.enhance)?;
                if options.put_cache {
                    self.caches.computed.insert(address, ins.clone());
                }
                ins
            }
        };

        if options.put_backward_cache {
            self.caches.backward.insert(ins.next, ins.address);
        }
        Some(ins)
    }

    /// Like [`resolve`](Self::resolve), but checks that `address` is mapped
    /// before asking for a full instruction's worth of bytes.
    pub fn one<T: Target + ?Sized>(
        &mut self,
        target: &T,
        address: Address,
        emu: Option<&mut (dyn Emulator + '_)>,
        options: ResolveOptions,
    ) -> Option<Instruction> {
        if !target.is_readable(address) {
            log::trace!("{address:#x} is not readable");
            return None;
        }
        self.resolve(target, address, emu, options)
    }

    /// Static decode with no enhancement and no cache side effects.
    pub fn one_raw<T: Target + ?Sized>(&self, target: &T, address: Address) -> Option<Instruction> {
        let bytes = target.read(address, self.arch.max_instruction_size(), true)?;
        let mode = self.isa_mode_at(target, address);
        self.decoder
            .decode(&bytes, address, self.arch, mode, self.endian)
            .map(Instruction::from_insn)
    }

    /// Up to `count` instructions starting at `address`, each following the
    /// previous one's `next`.
    pub fn get<T: Target + ?Sized>(
        &mut self,
        target: &T,
        address: Address,
        count: usize,
        mut emu: Option<&mut (dyn Emulator + '_)>,
        options: ResolveOptions,
    ) -> Vec<Instruction> {
        let mut out = Vec::with_capacity(count);
        let mut address = address;

        while out.len() < count {
            let Some(ins) = self.one(target, address, emu.as_deref_mut(), options) else {
                break;
            };
            address = ins.next;
            out.push(ins);
        }
        out
    }

    fn computed(&self, address: Address, from_cache: bool) -> Option<Instruction> {
        if !from_cache {
            return None;
        }
        self.caches.computed.get(address).cloned()
    }

    fn decode_at<T: Target + ?Sized>(
        &self,
        target: &T,
        address: Address,
        emu: Option<&mut (dyn Emulator + '_)>,
        enhance: bool,
    ) -> Option<Instruction> {
        let bytes = target.read(address, self.arch.max_instruction_size(), true)?;
        let mode = self.isa_mode_at(target, address);
        let Some(insn) = self.decoder.decode(&bytes, address, self.arch, mode, self.endian) else {
            log::trace!("no instruction decodes at {address:#x} ({mode:?})");
            return None;
        };

        if enhance {
            Some(self.enhancer.enhance(insn, emu))
        } else {
            Some(Instruction::from_insn(insn))
        }
    }
}
