//! The window builder: the listing shown around the program counter.

use crate::decoder::Decoder;
use crate::emulator::{Emulator, EmulatorError};
use crate::resolver::{Disassembler, ResolveOptions};
use crate::target::Target;
use crate::{Address, Instruction, Settings, SplitType};

/// Options for [`Disassembler::near`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearOptions {
    /// Predict branches with an emulator when the window starts at the live pc
    pub emulate: bool,
    /// Include instructions that executed before `address`
    pub show_previous: bool,
    /// Let the backward fill answer from the computed-instruction cache
    pub use_cache: bool,
    /// Walk memory sequentially, ignoring control flow
    pub linear: bool,
}

impl Default for NearOptions {
    fn default() -> Self {
        Self {
            emulate: false,
            show_previous: true,
            use_cache: false,
            linear: false,
        }
    }
}

impl NearOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            emulate: settings.emulate,
            show_previous: settings.show_previous,
            ..Self::default()
        }
    }
}

/// An ordered listing with the requested instruction marked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Window {
    instructions: Vec<Instruction>,
    current: Option<usize>,
}

impl Window {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Index of the requested address in [`instructions`](Self::instructions).
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Option<&Instruction> {
        self.current.and_then(|i| self.instructions.get(i))
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn into_instructions(self) -> Vec<Instruction> {
        self.instructions
    }
}

impl<D: Decoder> Disassembler<D> {
    /// Build the listing around `address`: up to `radius` instructions that
    /// executed before it, the instruction itself, and up to `radius` that
    /// will execute after it.
    ///
    /// The result is empty when `address` does not decode, or when an
    /// emulator was wanted but the debuggee lacks memory it needs.
    pub fn near<T: Target + ?Sized>(
        &mut self,
        target: &T,
        address: Address,
        radius: usize,
        options: NearOptions,
    ) -> Window {
        let mut emu = match self.acquire_emulator(target, address, options.emulate) {
            Ok(emu) => emu,
            Err(e) => {
                log::debug!("no window at {address:#x}: {e}");
                return Window::empty();
            }
        };

        let Some(current) = self.one(target, address, emu.as_deref_mut(), ResolveOptions::cached())
        else {
            return Window::empty();
        };
        log::trace!("window center {current}");

        let mut instructions = if options.show_previous {
            self.previous(target, &current, radius, options)
        } else {
            Vec::new()
        };
        let current_index = instructions.len();
        self.caches.frontier.reset(current.target);
        instructions.push(current);

        let total = 1 + 2 * radius;
        let mut last = current_index;
        while instructions.len() < total {
            let insn = instructions[last].clone();
            let mut next = if options.linear {
                insn.fallthrough()
            } else {
                insn.next
            };

            if emu
                .as_deref()
                .is_some_and(|e| !e.last_step_succeeded() || !e.is_valid())
            {
                log::debug!("emulator lost sync after {:#x}, continuing statically", insn.address);
                emu = None;
            }

            if let Some(e) = emu.as_deref() {
                if self.arch().has_switchable_mode() {
                    self.caches.mode.set_bit(e.pc(), e.read_mode_bit());
                }
            }

            let splits = insn.jump_like || insn.has_jump_target || insn.next == insn.address;
            if splits && !options.linear {
                let mut marked = last;
                if insn.causes_branch_delay {
                    let Some(slot) = self.delay_slot(target, &insn, emu.as_deref_mut()) else {
                        break;
                    };
                    let slot_end = slot.fallthrough();
                    let taken = !insn.call_like
                        && (insn.is_unconditional_jump || insn.is_conditional_jump_taken);
                    instructions.push(slot);
                    marked = instructions.len() - 1;

                    let resume = if taken { insn.target } else { Some(slot_end) };
                    let Some(resume) = resume else {
                        mark_split(&mut instructions[marked], &insn);
                        break;
                    };
                    next = resume;
                }
                mark_split(&mut instructions[marked], &insn);

                if instructions.len() >= total {
                    self.caches.frontier.add(next);
                    break;
                }
            }

            self.caches.frontier.add(next);
            match self.one(target, next, emu.as_deref_mut(), ResolveOptions::cached()) {
                Some(ins) => {
                    instructions.push(ins);
                    last = instructions.len() - 1;
                }
                None => break,
            }
        }

        // A jump to itself would otherwise fill the window with copies.
        while instructions.len() > current_index + 2 {
            let n = instructions.len();
            let tail = &instructions[n - 3..];
            if tail[0].address == tail[1].address && tail[1].address == tail[2].address {
                instructions.pop();
            } else {
                break;
            }
        }

        Window {
            instructions,
            current: Some(current_index),
        }
    }

    /// The enhanced instruction at the live program counter.
    pub fn current_instruction<T: Target + ?Sized>(
        &mut self,
        target: &T,
        emulate: bool,
    ) -> Option<Instruction> {
        let pc = target.pc(self.arch())?;
        let options = NearOptions {
            emulate,
            show_previous: false,
            ..NearOptions::default()
        };
        self.near(target, pc, 1, options).current().cloned()
    }

    pub fn emulate_one<T: Target + ?Sized>(&mut self, target: &T) -> Option<Instruction> {
        self.current_instruction(target, true)
    }

    pub fn no_emulate_one<T: Target + ?Sized>(&mut self, target: &T) -> Option<Instruction> {
        self.current_instruction(target, false)
    }

    /// [`current_instruction`](Self::current_instruction) with emulation
    /// following the session settings.
    pub fn one_with_config<T: Target + ?Sized>(&mut self, target: &T) -> Option<Instruction> {
        let emulate = self.settings.emulate;
        self.current_instruction(target, emulate)
    }

    /// An emulator seeded at `address`, if emulation is wanted and possible.
    ///
    /// Only `MemoryUnavailable` is an error; every other failure degrades to
    /// a static window.
    fn acquire_emulator<T: Target + ?Sized>(
        &mut self,
        target: &T,
        address: Address,
        wanted: bool,
    ) -> Result<Option<Box<dyn Emulator>>, EmulatorError> {
        let arch = self.arch();
        if !wanted || !self.settings.emulate || !arch.supports_emulation() {
            return Ok(None);
        }
        if target.pc(arch) != Some(address) {
            return Ok(None);
        }
        if !self.gate.check() {
            self.settings.emulate = false;
            return Ok(None);
        }

        match target.create_emulator(arch) {
            Ok(emu) => Ok(Some(emu)),
            Err(e @ EmulatorError::MemoryUnavailable(_)) => Err(e),
            Err(e) => {
                log::warn!("branch prediction unavailable at {address:#x}: {e}");
                Ok(None)
            }
        }
    }

    /// Instructions that executed before `current`, oldest first.
    fn previous<T: Target + ?Sized>(
        &mut self,
        target: &T,
        current: &Instruction,
        radius: usize,
        options: NearOptions,
    ) -> Vec<Instruction> {
        let history = ResolveOptions {
            from_cache: options.use_cache,
            put_backward_cache: false,
            ..ResolveOptions::default()
        };

        let mut previous: Vec<Instruction> = Vec::with_capacity(radius);
        let mut successor = current.address;
        while previous.len() < radius {
            let Some(&address) = self.caches.backward.get(successor) else {
                break;
            };
            // A jump to itself is its own predecessor; the forward fill shows the repeat.
            if address == successor {
                break;
            }
            let Some(mut insn) = self.one(target, address, None, history) else {
                break;
            };
            if !options.linear
                && insn.jump_like
                && !insn.causes_branch_delay
                && insn.split == SplitType::NoSplit
            {
                insn.split = SplitType::BranchNotTaken;
            }
            successor = insn.address;
            previous.push(insn);
        }
        previous.reverse();
        previous
    }

    /// Resolve the delay-slot instruction after `branch` and stitch the
    /// history so walking backward passes through the slot.
    fn delay_slot<T: Target + ?Sized>(
        &mut self,
        target: &T,
        branch: &Instruction,
        emu: Option<&mut (dyn Emulator + '_)>,
    ) -> Option<Instruction> {
        // The emulator steps branch and slot together; it is out of sync now.
        if let Some(emu) = emu {
            emu.invalidate();
        }
        let slot = self.one(target, branch.fallthrough(), None, ResolveOptions::cached())?;

        self.caches.backward.insert(branch.next, slot.address);
        self.caches.backward.insert(slot.fallthrough(), slot.address);
        self.caches.backward.insert(slot.address, branch.address);
        Some(slot)
    }
}

fn mark_split(entry: &mut Instruction, branch: &Instruction) {
    entry.split = if branch.next != branch.fallthrough() || branch.force_unconditional_jump_target
    {
        SplitType::BranchTaken
    } else {
        SplitType::BranchNotTaken
    };
}
