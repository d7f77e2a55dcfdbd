//! Goblin-based loader turning ELF, PE and Mach-O files into a static
//! debuggee image.
//!
//! An [`ImageTarget`] has memory and a program counter but no live process,
//! so it never offers an emulator and every window built over it is static.

use std::fmt;
use std::path::Path;

use goblin::elf::program_header::PT_LOAD;
use goblin::elf::section_header::{SHF_ALLOC, SHT_NOBITS};
use goblin::mach::{constants::cputype, Mach, MachO};
use goblin::{elf, pe, Object};

use crate::target::{Memory, Registers, Target};
use crate::{Address, Architecture, DisasmError, Endian};

const EF_MIPS_ARCH: u32 = 0xf000_0000;
const EF_MIPS_ARCH_32R6: u32 = 0x9000_0000;

/// A loaded region of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: Address,
    pub bytes: Vec<u8>,
}

impl Segment {
    pub fn new(address: Address, bytes: Vec<u8>) -> Self {
        Self { address, bytes }
    }

    pub fn end_address(&self) -> Address {
        self.address + self.bytes.len() as Address
    }

    fn contains(&self, address: Address) -> bool {
        address >= self.address && address < self.end_address()
    }
}

/// A binary image standing in for a stopped debuggee.
#[derive(Debug, Clone)]
pub struct ImageTarget {
    arch: Architecture,
    endian: Endian,
    entry: Address,
    pc: Address,
    thumb: bool,
    segments: Vec<Segment>,
}

impl ImageTarget {
    pub fn new(arch: Architecture, endian: Endian, entry: Address, segments: Vec<Segment>) -> Self {
        let mut image = Self {
            arch,
            endian,
            entry,
            pc: entry,
            thumb: arch == Architecture::ArmCortexM,
            segments,
        };
        image.entry = image.strip_thumb_bit(entry);
        image.pc = image.entry;
        image
    }

    pub fn architecture(&self) -> Architecture {
        self.arch
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn entry(&self) -> Address {
        self.entry
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Pretend the debuggee stopped at `pc`. On ARM an odd address selects
    /// Thumb, as it does for a branch-and-exchange.
    pub fn with_pc(mut self, pc: Address) -> Self {
        self.pc = self.strip_thumb_bit(pc);
        self
    }

    fn strip_thumb_bit(&mut self, address: Address) -> Address {
        if self.arch == Architecture::Arm {
            self.thumb = address & 1 == 1;
            address & !1
        } else if self.arch == Architecture::ArmCortexM {
            address & !1
        } else {
            address
        }
    }
}

impl Memory for ImageTarget {
    fn read(&self, address: Address, len: usize, partial: bool) -> Option<Vec<u8>> {
        let segment = self.segments.iter().find(|s| s.contains(address))?;
        let start = (address - segment.address) as usize;
        let available = segment.bytes.len() - start;
        if available < len && !partial {
            return None;
        }
        Some(segment.bytes[start..start + len.min(available)].to_vec())
    }
}

impl Registers for ImageTarget {
    fn read_register(&self, name: &str) -> Option<u64> {
        if name == self.arch.pc_register() {
            return Some(self.pc);
        }
        let mode = self.arch.mode_register()?;
        (name == mode.name).then(|| if self.thumb { 1 << mode.bit } else { 0 })
    }
}

impl Target for ImageTarget {}

/// A parser that handles ELF, PE, and Mach-O via Goblin.
#[derive(Debug, Default)]
pub struct GoblinParser;

impl GoblinParser {
    /// Construct a new GoblinParser.
    pub fn new() -> Self {
        GoblinParser
    }

    /// Load an image from memory.
    pub fn load(&self, data: &[u8]) -> Result<ImageTarget, DisasmError> {
        match Object::parse(data) {
            Ok(Object::Elf(elf)) => self.load_elf(&elf, data),
            Ok(Object::PE(pe)) => self.load_pe(&pe, data),
            Ok(Object::Mach(Mach::Binary(macho))) => self.load_macho(&macho),
            Ok(Object::Mach(Mach::Fat(_))) => Err(DisasmError::Parsing(
                "fat Mach-O archives are not supported".into(),
            )),
            Ok(_) => Err(DisasmError::Parsing("Unsupported file format".into())),
            Err(e) => Err(DisasmError::Parsing(e.to_string())),
        }
    }

    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ImageTarget, DisasmError> {
        let data = std::fs::read(path.as_ref())?;
        self.load(&data)
    }

    /// Treat `data` as raw code mapped at `base`.
    pub fn load_raw(&self, data: &[u8], arch: Architecture, base: Address) -> ImageTarget {
        let segments = vec![Segment::new(base, data.to_vec())];
        ImageTarget::new(arch, arch.default_endian(), base, segments)
    }

    fn load_elf(&self, elf: &elf::Elf, data: &[u8]) -> Result<ImageTarget, DisasmError> {
        use elf::header::*;

        let arch = match elf.header.e_machine {
            EM_386 => Architecture::X86_32,
            EM_X86_64 => Architecture::X86_64,
            EM_ARM => Architecture::Arm,
            EM_AARCH64 => Architecture::AArch64,
            EM_MIPS if elf.header.e_flags & EF_MIPS_ARCH == EF_MIPS_ARCH_32R6 => {
                Architecture::Mips32R6
            }
            EM_MIPS => Architecture::Mips32,
            EM_SPARC => Architecture::Sparc,
            EM_SPARCV9 => Architecture::SparcV9,
            EM_PPC => Architecture::Ppc32,
            EM_RISCV => match elf.header.e_ident[EI_CLASS] {
                ELFCLASS32 => Architecture::RiscV32,
                ELFCLASS64 => Architecture::RiscV64,
                _ => Architecture::Unknown,
            },
            machine => {
                return Err(DisasmError::Parsing(format!(
                    "unsupported ELF machine {machine}"
                )))
            }
        };
        let endian = if elf.little_endian {
            Endian::Little
        } else {
            Endian::Big
        };

        let mut segments: Vec<Segment> = elf
            .program_headers
            .iter()
            .filter(|ph| ph.p_type == PT_LOAD && ph.p_filesz > 0)
            .filter_map(|ph| {
                let bytes = file_range(data, ph.p_offset, ph.p_filesz)?;
                Some(Segment::new(ph.p_vaddr, bytes))
            })
            .collect();

        // Relocatable objects have no program headers.
        if segments.is_empty() {
            segments = elf
                .section_headers
                .iter()
                .filter(|sh| sh.sh_flags & SHF_ALLOC as u64 != 0 && sh.sh_type != SHT_NOBITS)
                .filter_map(|sh| {
                    let bytes = file_range(data, sh.sh_offset, sh.sh_size)?;
                    Some(Segment::new(sh.sh_addr, bytes))
                })
                .collect();
        }
        log::debug!("ELF {arch}: {} loadable regions, entry {:#x}", segments.len(), elf.entry);

        Ok(ImageTarget::new(arch, endian, elf.entry, segments))
    }

    fn load_pe(&self, pe: &pe::PE<'_>, data: &[u8]) -> Result<ImageTarget, DisasmError> {
        let arch = match pe.header.coff_header.machine {
            pe::header::COFF_MACHINE_X86 => Architecture::X86_32,
            pe::header::COFF_MACHINE_X86_64 => Architecture::X86_64,
            pe::header::COFF_MACHINE_ARM64 => Architecture::AArch64,
            machine => {
                return Err(DisasmError::Parsing(format!(
                    "unsupported PE machine {machine:#x}"
                )))
            }
        };
        let base = pe.image_base as Address;

        let segments: Vec<Segment> = pe
            .sections
            .iter()
            .filter_map(|sect| {
                let bytes = file_range(
                    data,
                    sect.pointer_to_raw_data as u64,
                    sect.size_of_raw_data as u64,
                )?;
                Some(Segment::new(base + sect.virtual_address as Address, bytes))
            })
            .collect();

        Ok(ImageTarget::new(
            arch,
            Endian::Little,
            base + pe.entry as Address,
            segments,
        ))
    }

    fn load_macho(&self, macho: &MachO<'_>) -> Result<ImageTarget, DisasmError> {
        let arch = match macho.header.cputype {
            cputype::CPU_TYPE_I386 => Architecture::X86_32,
            cputype::CPU_TYPE_X86_64 => Architecture::X86_64,
            cputype::CPU_TYPE_ARM => Architecture::Arm,
            cputype::CPU_TYPE_ARM64 => Architecture::AArch64,
            cputype => {
                return Err(DisasmError::Parsing(format!(
                    "unsupported Mach-O CPU type {cputype:#x}"
                )))
            }
        };

        let segments: Vec<Segment> = macho
            .segments
            .iter()
            .filter(|seg| !seg.data.is_empty())
            .map(|seg| Segment::new(seg.vmaddr, seg.data.to_vec()))
            .collect();

        Ok(ImageTarget::new(arch, Endian::Little, macho.entry, segments))
    }
}

fn file_range(data: &[u8], offset: u64, size: u64) -> Option<Vec<u8>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(usize::try_from(size).ok()?)?;
    data.get(start..end).map(<[u8]>::to_vec)
}

impl fmt::Display for GoblinParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GoblinParser")
    }
}
