//! Cartridge (ROM) related functions and structures.

use pocketboy_common::{
    error::Error,
    util::{read_file, write_file},
};
use core::fmt;
use std::{
    cmp::max,
    fmt::{Display, Formatter},
    path::Path,
    vec,
};

use crate::{debugln, gb::GameBoy, mmu::BusComponent, warnln};

pub const ROM_BANK_SIZE: usize = 16384;
pub const RAM_BANK_SIZE: usize = 8192;

/// The size of the fixed nibble RAM built into the MBC2
/// controller (512 x 4 bits).
pub const MBC2_RAM_SIZE: usize = 512;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RomType {
    RomOnly = 0x00,
    Mbc1 = 0x01,
    Mbc1Ram = 0x02,
    Mbc1RamBattery = 0x03,
    Mbc2 = 0x05,
    Mbc2Battery = 0x06,
    RomRam = 0x08,
    RomRamBattery = 0x09,
    Mmm01 = 0x0b,
    Mmm01Ram = 0x0c,
    Mmm01RamBattery = 0x0d,
    Mbc3TimerBattery = 0x0f,
    Mbc3TimerRamBattery = 0x10,
    Mbc3 = 0x11,
    Mbc3Ram = 0x12,
    Mbc3RamBattery = 0x13,
    Mbc5 = 0x19,
    Mbc5Ram = 0x1a,
    Mbc5RamBattery = 0x1b,
    Mbc5Rumble = 0x1c,
    Mbc5RumbleRam = 0x1d,
    Mbc5RumbleRamBattery = 0x1e,
    Unknown = 0xef,
}

impl RomType {
    pub fn description(&self) -> &'static str {
        match self {
            RomType::RomOnly => "ROM Only",
            RomType::Mbc1 => "MBC1",
            RomType::Mbc1Ram => "MBC1 + RAM",
            RomType::Mbc1RamBattery => "MBC1 + RAM + Battery",
            RomType::Mbc2 => "MBC2",
            RomType::Mbc2Battery => "MBC2 + BATTERY",
            RomType::RomRam => "ROM + RAM",
            RomType::RomRamBattery => "ROM + RAM + BATTERY",
            RomType::Mmm01 => "MMM01",
            RomType::Mmm01Ram => "MMM01 + RAM",
            RomType::Mmm01RamBattery => "MMM01 + RAM + BATTERY",
            RomType::Mbc3TimerBattery => "MBC3 + TIMER + BATTERY",
            RomType::Mbc3TimerRamBattery => "MBC3 + TIMER + RAM + BATTERY",
            RomType::Mbc3 => "MBC3",
            RomType::Mbc3Ram => "MBC3 + RAM",
            RomType::Mbc3RamBattery => "MBC3 + RAM + BATTERY",
            RomType::Mbc5 => "MBC5",
            RomType::Mbc5Ram => "MBC5 + RAM",
            RomType::Mbc5RamBattery => "MBC5 + RAM + BATTERY",
            RomType::Mbc5Rumble => "MBC5 + RUMBLE",
            RomType::Mbc5RumbleRam => "MBC5 + RUMBLE + RAM",
            RomType::Mbc5RumbleRamBattery => "MBC5 + RUMBLE + RAM + BATTERY",
            RomType::Unknown => "Unknown",
        }
    }
}

impl Display for RomType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RomSize {
    Size32K,
    Size64K,
    Size128K,
    Size256K,
    Size512K,
    Size1M,
    Size2M,
    Size4M,
    Size8M,
    SizeUnknown,
}

impl RomSize {
    pub fn description(&self) -> &'static str {
        match self {
            RomSize::Size32K => "32 KB",
            RomSize::Size64K => "64 KB",
            RomSize::Size128K => "128 KB",
            RomSize::Size256K => "256 KB",
            RomSize::Size512K => "512 KB",
            RomSize::Size1M => "1 MB",
            RomSize::Size2M => "2 MB",
            RomSize::Size4M => "4 MB",
            RomSize::Size8M => "8 MB",
            RomSize::SizeUnknown => "Unknown",
        }
    }

    pub fn rom_banks(&self) -> u16 {
        match self {
            RomSize::Size32K => 2,
            RomSize::Size64K => 4,
            RomSize::Size128K => 8,
            RomSize::Size256K => 16,
            RomSize::Size512K => 32,
            RomSize::Size1M => 64,
            RomSize::Size2M => 128,
            RomSize::Size4M => 256,
            RomSize::Size8M => 512,
            RomSize::SizeUnknown => 0,
        }
    }
}

impl Display for RomSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RamSize {
    NoRam,
    Unused,
    Size8K,
    Size16K,
    Size32K,
    Size64K,
    Size128K,
    SizeUnknown,
}

impl RamSize {
    pub fn description(&self) -> &'static str {
        match self {
            RamSize::NoRam => "No RAM",
            RamSize::Unused => "Unused",
            RamSize::Size8K => "8 KB",
            RamSize::Size16K => "16 KB",
            RamSize::Size32K => "32 KB",
            RamSize::Size64K => "64 KB",
            RamSize::Size128K => "128 KB",
            RamSize::SizeUnknown => "Unknown",
        }
    }

    pub fn ram_banks(&self) -> u16 {
        match self {
            RamSize::NoRam => 0,
            RamSize::Unused => 0,
            RamSize::Size8K => 1,
            RamSize::Size16K => 2,
            RamSize::Size32K => 4,
            RamSize::Size64K => 8,
            RamSize::Size128K => 16,
            RamSize::SizeUnknown => 0,
        }
    }
}

impl Display for RamSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Region {
    Japan,
    World,
    Unknown,
}

impl Region {
    pub fn description(&self) -> &'static str {
        match self {
            Region::Japan => "Japan",
            Region::World => "World",
            Region::Unknown => "Unknown",
        }
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CgbMode {
    NoCgb = 0x00,
    CgbCompatible = 0x80,
    CgbOnly = 0xc0,
}

impl CgbMode {
    pub fn description(&self) -> &'static str {
        match self {
            CgbMode::NoCgb => "No CGB support",
            CgbMode::CgbCompatible => "CGB backwards compatible",
            CgbMode::CgbOnly => "CGB only",
        }
    }
}

impl Display for CgbMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SgbMode {
    NoSgb = 0x00,
    SgbFunctions = 0x03,
}

/// Set of registers of the real time clock used by MBC3
/// cartridges, the `days` value is 9 bits wide.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcState {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days: u16,
}

/// Memory Bank Controller state, one variant per supported
/// mapper, each carrying the small set of mutable control
/// fields that the mapper exposes through ROM-area writes.
#[derive(Clone, PartialEq, Eq)]
pub enum Mbc {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        upper_bits: u8,
        mode: bool,
        ram_enabled: bool,
    },
    Mbc2 {
        rom_bank: u8,
        ram_enabled: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_select: u8,
        ram_enabled: bool,
        latch_byte: u8,
        rtc_cycles: u32,
        rtc_ctrl: u8,
        rtc: RtcState,
        rtc_shadow: RtcState,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enabled: bool,
    },
}

impl Mbc {
    /// Builds the initial MBC state for the provided ROM type,
    /// unsupported mappers result in a load error.
    pub fn from_rom_type(rom_type: RomType) -> Result<Self, Error> {
        Ok(match rom_type {
            RomType::RomOnly | RomType::RomRam | RomType::RomRamBattery => Mbc::NoMbc,
            RomType::Mbc1 | RomType::Mbc1Ram | RomType::Mbc1RamBattery => Mbc::Mbc1 {
                rom_bank: 1,
                upper_bits: 0,
                mode: false,
                ram_enabled: false,
            },
            RomType::Mbc2 | RomType::Mbc2Battery => Mbc::Mbc2 {
                rom_bank: 1,
                ram_enabled: false,
            },
            RomType::Mbc3
            | RomType::Mbc3Ram
            | RomType::Mbc3RamBattery
            | RomType::Mbc3TimerBattery
            | RomType::Mbc3TimerRamBattery => Mbc::Mbc3 {
                rom_bank: 1,
                ram_select: 0,
                ram_enabled: false,
                latch_byte: 0,
                rtc_cycles: 0,
                rtc_ctrl: 0,
                rtc: RtcState::default(),
                rtc_shadow: RtcState::default(),
            },
            RomType::Mbc5
            | RomType::Mbc5Ram
            | RomType::Mbc5RamBattery
            | RomType::Mbc5Rumble
            | RomType::Mbc5RumbleRam
            | RomType::Mbc5RumbleRamBattery => Mbc::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enabled: false,
            },
            rom_type => return Err(Error::UnknownMbc(rom_type as u8)),
        })
    }

    pub fn description(&self) -> &'static str {
        match self {
            Mbc::NoMbc => "No MBC",
            Mbc::Mbc1 { .. } => "MBC1",
            Mbc::Mbc2 { .. } => "MBC2",
            Mbc::Mbc3 { .. } => "MBC3",
            Mbc::Mbc5 { .. } => "MBC5",
        }
    }
}

impl Display for Mbc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Structure that defines the ROM and ROM contents
/// of a Game Boy cartridge. Should correctly address
/// the specifics of all the major MBCs (Memory Bank
/// Controllers).
#[derive(Clone)]
pub struct Cartridge {
    /// The complete data of the ROM cartridge, should
    /// include the complete set of ROM banks.
    rom_data: Vec<u8>,

    /// The RAM that is going to be used to store
    /// temporary data for the cartridge, may be
    /// battery backed.
    ram_data: Vec<u8>,

    /// The MBC (Memory Bank Controller) state in charge
    /// of bank switching for the current cartridge.
    mbc: Mbc,

    /// The number of ROM banks (of 16KB) that are available
    /// to the current cartridge, this is a computed value
    /// to allow improved performance.
    rom_bank_count: u16,

    /// The number of RAM banks (of 8KB) that are available
    /// to the current cartridge, this is a computed value
    /// to allow improved performance.
    ram_bank_count: u16,

    /// Path of the file the ROM was loaded from, used for
    /// the discovery of the SRAM sidecar file.
    rom_path: Option<String>,

    /// The final offset of the last character of the title
    /// that is considered to be non zero (0x0) so that a
    /// proper safe conversion to UTF-8 string can be done.
    title_offset: usize,
}

impl Cartridge {
    pub fn new() -> Self {
        Self {
            rom_data: vec![],
            ram_data: vec![],
            mbc: Mbc::NoMbc,
            rom_bank_count: 0,
            ram_bank_count: 0,
            rom_path: None,
            title_offset: 0x0143,
        }
    }

    pub fn from_data(data: &[u8]) -> Result<Self, Error> {
        let mut cartridge = Cartridge::new();
        cartridge.set_data(data)?;
        Ok(cartridge)
    }

    /// Loads a cartridge from the provided file path, trying to
    /// populate the cartridge RAM from the SRAM sidecar file in
    /// case one exists next to the ROM file.
    pub fn from_file(path: &str) -> Result<Self, Error> {
        let data = read_file(path)?;
        let mut cartridge = Self::from_data(&data)?;
        cartridge.rom_path = Some(String::from(path));
        cartridge.load_sram_file()?;
        Ok(cartridge)
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            // 0x0000-0x7FFF: 16 KiB ROM bank 00 & 16 KiB ROM Bank 01-NN
            0x0000..=0x7fff => self.read_rom(addr),
            // 0xA000-0xBFFF: 8 KiB External RAM
            0xa000..=0xbfff => self.read_ram(addr),
            _ => {
                debugln!("Reading from unknown Cartridge location 0x{:04x}", addr);
                0xff
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            // 0x0000-0x7FFF: MBC control registers
            0x0000..=0x7fff => self.write_rom(addr, value),
            // 0xA000-0xBFFF: 8 KiB External RAM
            0xa000..=0xbfff => self.write_ram(addr, value),
            _ => debugln!("Writing to unknown Cartridge location 0x{:04x}", addr),
        }
    }

    fn read_rom(&self, addr: u16) -> u8 {
        let bank_count = max(self.rom_bank_count, 1) as usize;
        match &self.mbc {
            Mbc::NoMbc => *self.rom_data.get(addr as usize).unwrap_or(&0xff),
            Mbc::Mbc1 {
                rom_bank,
                upper_bits,
                mode,
                ..
            } => {
                let upper = (*upper_bits as usize) << 5;
                if addr < 0x4000 {
                    let bank = if *mode { upper % bank_count } else { 0 };
                    self.read_rom_bank(bank, addr)
                } else {
                    let bank = (upper | *rom_bank as usize) % bank_count;
                    self.read_rom_bank(bank, addr)
                }
            }
            Mbc::Mbc2 { rom_bank, .. } => {
                if addr < 0x4000 {
                    self.rom_data[addr as usize]
                } else {
                    self.read_rom_bank(*rom_bank as usize % bank_count, addr)
                }
            }
            Mbc::Mbc3 { rom_bank, .. } => {
                if addr < 0x4000 {
                    self.rom_data[addr as usize]
                } else {
                    self.read_rom_bank(*rom_bank as usize % bank_count, addr)
                }
            }
            Mbc::Mbc5 { rom_bank, .. } => {
                if addr < 0x4000 {
                    self.rom_data[addr as usize]
                } else {
                    self.read_rom_bank(*rom_bank as usize % bank_count, addr)
                }
            }
        }
    }

    fn write_rom(&mut self, addr: u16, value: u8) {
        match &mut self.mbc {
            Mbc::NoMbc => match addr {
                // ignores this address as Tetris and some other games write
                // to this address for some reason (probably related to
                // some kind of MBC1 compatibility issue)
                0x2000 => (),
                _ => debugln!("Writing to unknown Cartridge location 0x{:04x}", addr),
            },
            Mbc::Mbc1 {
                rom_bank,
                upper_bits,
                mode,
                ram_enabled,
            } => match addr {
                // 0x0000-0x1FFF - RAM enabled flag
                0x0000..=0x1fff => *ram_enabled = (value & 0x0f) == 0x0a,
                // 0x2000-0x3FFF - ROM bank selection 5 lower bits
                0x2000..=0x3fff => {
                    let mut bank = value & 0x1f;
                    if bank == 0 {
                        bank = 1;
                    }
                    *rom_bank = bank;
                }
                // 0x4000-0x5FFF - RAM bank selection and ROM bank selection upper bits
                0x4000..=0x5fff => *upper_bits = value & 0x03,
                // 0x6000-0x7FFF - ROM mode selection
                0x6000..=0x7fff => *mode = value & 0x01 == 0x01,
                _ => warnln!("Writing to unknown Cartridge location 0x{:04x}", addr),
            },
            Mbc::Mbc2 {
                rom_bank,
                ram_enabled,
            } => {
                // a single control window exists, with address bit 8
                // selecting between the ROM bank and RAM enable latches
                if addr < 0x4000 {
                    if addr & 0x0100 == 0x0100 {
                        let mut bank = value & 0x0f;
                        if bank == 0 {
                            bank = 1;
                        }
                        *rom_bank = bank;
                    } else {
                        *ram_enabled = (value & 0x0f) == 0x0a;
                    }
                }
            }
            Mbc::Mbc3 {
                rom_bank,
                ram_select,
                ram_enabled,
                latch_byte,
                rtc,
                rtc_shadow,
                ..
            } => match addr {
                // 0x0000-0x1FFF - RAM and RTC enabled flag
                0x0000..=0x1fff => *ram_enabled = (value & 0x0f) == 0x0a,
                // 0x2000-0x3FFF - ROM bank selection, MBC3 carts will
                // access banks 1-7F, MBC30 1-FF
                0x2000..=0x3fff => {
                    let mut bank = value;
                    if bank == 0 {
                        bank = 1;
                    }
                    *rom_bank = bank;
                }
                // 0x4000-0x5FFF - RAM bank or RTC register selection
                0x4000..=0x5fff => *ram_select = value,
                // 0x6000-0x7FFF - RTC latch, writing 0x00 followed by 0x01
                // snapshots the live clock into the shadow registers
                0x6000..=0x7fff => {
                    if *latch_byte == 0x00 && value == 0x01 {
                        *rtc_shadow = *rtc;
                    }
                    *latch_byte = value;
                }
                _ => warnln!("Writing to unknown Cartridge location 0x{:04x}", addr),
            },
            Mbc::Mbc5 {
                rom_bank,
                ram_bank,
                ram_enabled,
            } => match addr {
                // 0x0000-0x1FFF - RAM enabled flag
                0x0000..=0x1fff => *ram_enabled = (value & 0x0f) == 0x0a,
                // 0x2000-0x2FFF - ROM bank selection 8 lower bits,
                // bank 0 is addressable on MBC5
                0x2000..=0x2fff => *rom_bank = (*rom_bank & 0x0100) | value as u16,
                // 0x3000-0x3FFF - ROM bank selection 9th bit
                0x3000..=0x3fff => {
                    *rom_bank = (*rom_bank & 0x00ff) | (((value & 0x01) as u16) << 8)
                }
                // 0x4000-0x5FFF - RAM bank selection
                0x4000..=0x5fff => *ram_bank = value & 0x0f,
                _ => warnln!("Writing to unknown Cartridge location 0x{:04x}", addr),
            },
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        let offset = (addr - 0xa000) as usize;
        match &self.mbc {
            Mbc::NoMbc => 0xff,
            Mbc::Mbc1 {
                upper_bits,
                mode,
                ram_enabled,
                ..
            } => {
                if !*ram_enabled {
                    return 0xff;
                }
                let bank = self.mbc1_ram_bank(*upper_bits, *mode);
                *self
                    .ram_data
                    .get(bank * RAM_BANK_SIZE + offset)
                    .unwrap_or(&0xff)
            }
            Mbc::Mbc2 { ram_enabled, .. } => {
                if !*ram_enabled {
                    return 0xff;
                }
                (self.ram_data[offset & 0x01ff] & 0x0f) | 0xf0
            }
            Mbc::Mbc3 {
                ram_select,
                ram_enabled,
                rtc_ctrl,
                rtc_shadow,
                ..
            } => match ram_select {
                0x00..=0x07 => {
                    if !*ram_enabled {
                        return 0xff;
                    }
                    *self
                        .ram_data
                        .get(*ram_select as usize * RAM_BANK_SIZE + offset)
                        .unwrap_or(&0xff)
                }
                0x08 => rtc_shadow.seconds,
                0x09 => rtc_shadow.minutes,
                0x0a => rtc_shadow.hours,
                0x0b => (rtc_shadow.days & 0xff) as u8,
                0x0c => rtc_ctrl | ((rtc_shadow.days >> 8) & 0x01) as u8,
                _ => 0xff,
            },
            Mbc::Mbc5 {
                ram_bank,
                ram_enabled,
                ..
            } => {
                if !*ram_enabled {
                    return 0xff;
                }
                let bank = *ram_bank as usize % max(self.ram_bank_count, 1) as usize;
                *self
                    .ram_data
                    .get(bank * RAM_BANK_SIZE + offset)
                    .unwrap_or(&0xff)
            }
        }
    }

    fn write_ram(&mut self, addr: u16, value: u8) {
        let offset = (addr - 0xa000) as usize;
        let ram_bank_count = max(self.ram_bank_count, 1) as usize;
        match &mut self.mbc {
            Mbc::NoMbc => (),
            Mbc::Mbc1 {
                upper_bits,
                mode,
                ram_enabled,
                ..
            } => {
                if !*ram_enabled {
                    return;
                }
                let bank = if *mode && ram_bank_count >= 4 {
                    *upper_bits as usize
                } else {
                    0
                };
                let index = bank * RAM_BANK_SIZE + offset;
                if index < self.ram_data.len() {
                    self.ram_data[index] = value;
                }
            }
            Mbc::Mbc2 { ram_enabled, .. } => {
                if !*ram_enabled {
                    return;
                }
                self.ram_data[offset & 0x01ff] = value & 0x0f;
            }
            Mbc::Mbc3 {
                ram_select,
                ram_enabled,
                rtc_cycles,
                rtc_ctrl,
                rtc,
                ..
            } => match ram_select {
                0x00..=0x07 => {
                    if !*ram_enabled {
                        return;
                    }
                    let index = *ram_select as usize * RAM_BANK_SIZE + offset;
                    if index < self.ram_data.len() {
                        self.ram_data[index] = value;
                    }
                }
                0x08 => {
                    *rtc_cycles = 0;
                    rtc.seconds = value & 0x3f;
                }
                0x09 => rtc.minutes = value & 0x3f,
                0x0a => rtc.hours = value & 0x1f,
                0x0b => rtc.days = (rtc.days & 0x100) | value as u16,
                0x0c => {
                    *rtc_ctrl = value & 0xc0;
                    rtc.days = (rtc.days & 0xff) | (((value & 0x01) as u16) << 8);
                }
                _ => (),
            },
            Mbc::Mbc5 {
                ram_bank,
                ram_enabled,
                ..
            } => {
                if !*ram_enabled {
                    return;
                }
                let bank = *ram_bank as usize % ram_bank_count;
                let index = bank * RAM_BANK_SIZE + offset;
                if index < self.ram_data.len() {
                    self.ram_data[index] = value;
                }
            }
        }
    }

    /// Reads a byte from the provided ROM bank, tolerating data
    /// shorter than the bank count announced in the header.
    fn read_rom_bank(&self, bank: usize, addr: u16) -> u8 {
        *self
            .rom_data
            .get(bank * ROM_BANK_SIZE + (addr & 0x3fff) as usize)
            .unwrap_or(&0xff)
    }

    /// Computes the RAM bank in use for MBC1 cartridges, the upper
    /// bits only select the RAM bank in advanced banking mode and
    /// when the cartridge carries at least 32 KiB of RAM.
    fn mbc1_ram_bank(&self, upper_bits: u8, mode: bool) -> usize {
        if mode && self.ram_bank_count >= 4 {
            upper_bits as usize
        } else {
            0
        }
    }

    /// Advances the live RTC of MBC3 cartridges, one second per
    /// `CPU_FREQ` T-cycles, unless the halt bit is set.
    pub fn clock(&mut self, cycles: u16) {
        let has_rtc = self.has_rtc();
        if let Mbc::Mbc3 {
            rtc_cycles,
            rtc_ctrl,
            rtc,
            ..
        } = &mut self.mbc
        {
            if !has_rtc || *rtc_ctrl & 0x40 == 0x40 {
                return;
            }

            *rtc_cycles += cycles as u32;
            if *rtc_cycles >= GameBoy::CPU_FREQ {
                *rtc_cycles -= GameBoy::CPU_FREQ;
                rtc.seconds = (rtc.seconds + 1) & 0x3f;
                if rtc.seconds == 60 {
                    rtc.seconds = 0;
                    rtc.minutes = (rtc.minutes + 1) & 0x3f;
                    if rtc.minutes == 60 {
                        rtc.minutes = 0;
                        rtc.hours = (rtc.hours + 1) & 0x1f;
                        if rtc.hours == 24 {
                            rtc.hours = 0;
                            rtc.days += 1;
                            if rtc.days == 512 {
                                rtc.days = 0;
                                *rtc_ctrl |= 0x80;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Restores the MBC control state to its power-on values,
    /// keeping both the ROM and the RAM contents in place.
    pub fn reset_banks(&mut self) {
        if let Ok(mbc) = Mbc::from_rom_type(self.rom_type()) {
            self.mbc = mbc;
        }
    }

    pub fn reset(&mut self) {
        self.rom_data = vec![];
        self.ram_data = vec![];
        self.mbc = Mbc::NoMbc;
        self.rom_bank_count = 0;
        self.ram_bank_count = 0;
        self.rom_path = None;
        self.title_offset = 0x0143;
    }

    fn set_data(&mut self, data: &[u8]) -> Result<(), Error> {
        self.ensure_data(data)?;
        self.rom_data = data.to_vec();
        self.mbc = Mbc::from_rom_type(self.rom_type())?;
        self.set_computed();
        self.set_title_offset();
        self.allocate_ram();
        Ok(())
    }

    fn set_computed(&mut self) {
        self.rom_bank_count = self.rom_size().rom_banks();
        self.ram_bank_count = self.ram_size().ram_banks();
    }

    fn set_title_offset(&mut self) {
        if self.rom_data.len() < 0x0143 {
            return;
        }
        let mut offset: usize = 0;
        for byte in &self.rom_data[0x0134..=0x0143] {
            if *byte == 0u8 {
                break;
            }

            // if we're at the final byte of the title and the value
            // is one that is reserved for CGB compatibility testing
            // then we must ignore it for title processing purposes
            if offset > 14
                && (*byte == CgbMode::CgbCompatible as u8 || *byte == CgbMode::CgbOnly as u8)
            {
                break;
            }

            offset += 1;
        }
        self.title_offset = 0x0134 + offset;
    }

    fn allocate_ram(&mut self) {
        let size = match self.mbc {
            Mbc::Mbc2 { .. } => MBC2_RAM_SIZE,
            _ => max(self.ram_bank_count, 1) as usize * RAM_BANK_SIZE,
        };
        self.ram_data = vec![0u8; size];
    }

    /// Ensures that the data provided is large enough to carry a
    /// complete cartridge header.
    fn ensure_data(&self, data: &[u8]) -> Result<(), Error> {
        if data.len() < 0x0150 {
            return Err(Error::RomSize);
        }
        Ok(())
    }

    /// Path of the SRAM sidecar file associated with the ROM file
    /// the cartridge was loaded from.
    pub fn sram_path(&self) -> Option<String> {
        self.rom_path.as_ref().map(|path| format!("{}.sram", path))
    }

    /// Populates the cartridge RAM from the SRAM sidecar file,
    /// a missing sidecar file is not an error.
    pub fn load_sram_file(&mut self) -> Result<(), Error> {
        if !self.has_battery() {
            return Ok(());
        }
        let Some(path) = self.sram_path() else {
            return Ok(());
        };
        if !Path::new(&path).exists() {
            return Ok(());
        }
        let data = read_file(&path)?;
        self.set_ram_data(&data);
        Ok(())
    }

    /// Writes the complete cartridge RAM contents into the SRAM
    /// sidecar file, a no-op for non battery-backed mappers.
    pub fn save_sram_file(&self) -> Result<(), Error> {
        if !self.has_battery() {
            return Ok(());
        }
        let Some(path) = self.sram_path() else {
            return Err(Error::InvalidParameter(String::from(
                "No file path associated with cartridge",
            )));
        };
        write_file(&path, &self.ram_data, None)?;
        Ok(())
    }

    pub fn title(&self) -> String {
        String::from(
            std::str::from_utf8(&self.rom_data[0x0134..self.title_offset])
                .unwrap_or("")
                .trim(),
        )
    }

    pub fn cgb_flag(&self) -> CgbMode {
        match self.rom_data[0x0143] {
            0x80 => CgbMode::CgbCompatible,
            0xc0 => CgbMode::CgbOnly,
            _ => CgbMode::NoCgb,
        }
    }

    pub fn sgb_flag(&self) -> SgbMode {
        match self.rom_data[0x0146] {
            0x03 => SgbMode::SgbFunctions,
            _ => SgbMode::NoSgb,
        }
    }

    pub fn rom_type(&self) -> RomType {
        if self.rom_data.len() < 0x0148 {
            return RomType::Unknown;
        }
        match self.rom_data[0x0147] {
            0x00 => RomType::RomOnly,
            0x01 => RomType::Mbc1,
            0x02 => RomType::Mbc1Ram,
            0x03 => RomType::Mbc1RamBattery,
            0x05 => RomType::Mbc2,
            0x06 => RomType::Mbc2Battery,
            0x08 => RomType::RomRam,
            0x09 => RomType::RomRamBattery,
            0x0b => RomType::Mmm01,
            0x0c => RomType::Mmm01Ram,
            0x0d => RomType::Mmm01RamBattery,
            0x0f => RomType::Mbc3TimerBattery,
            0x10 => RomType::Mbc3TimerRamBattery,
            0x11 => RomType::Mbc3,
            0x12 => RomType::Mbc3Ram,
            0x13 => RomType::Mbc3RamBattery,
            0x19 => RomType::Mbc5,
            0x1a => RomType::Mbc5Ram,
            0x1b => RomType::Mbc5RamBattery,
            0x1c => RomType::Mbc5Rumble,
            0x1d => RomType::Mbc5RumbleRam,
            0x1e => RomType::Mbc5RumbleRamBattery,
            _ => RomType::Unknown,
        }
    }

    pub fn rom_size(&self) -> RomSize {
        if self.rom_data.len() < 0x0149 {
            return RomSize::SizeUnknown;
        }
        match self.rom_data[0x0148] {
            0x00 => RomSize::Size32K,
            0x01 => RomSize::Size64K,
            0x02 => RomSize::Size128K,
            0x03 => RomSize::Size256K,
            0x04 => RomSize::Size512K,
            0x05 => RomSize::Size1M,
            0x06 => RomSize::Size2M,
            0x07 => RomSize::Size4M,
            0x08 => RomSize::Size8M,
            _ => RomSize::SizeUnknown,
        }
    }

    pub fn ram_size(&self) -> RamSize {
        if self.rom_data.len() < 0x014a {
            return RamSize::SizeUnknown;
        }
        match self.rom_data[0x0149] {
            0x00 => RamSize::NoRam,
            0x01 => RamSize::Unused,
            0x02 => RamSize::Size8K,
            0x03 => RamSize::Size32K,
            0x04 => RamSize::Size128K,
            0x05 => RamSize::Size64K,
            _ => RamSize::SizeUnknown,
        }
    }

    pub fn region(&self) -> Region {
        if self.rom_data.len() < 0x014b {
            return Region::Unknown;
        }
        match self.rom_data[0x014a] {
            0x00 => Region::Japan,
            0x01 => Region::World,
            _ => Region::Unknown,
        }
    }

    pub fn version(&self) -> u8 {
        self.rom_data[0x014c]
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.rom_type(),
            RomType::Mbc1RamBattery
                | RomType::Mbc2Battery
                | RomType::RomRamBattery
                | RomType::Mmm01RamBattery
                | RomType::Mbc3TimerBattery
                | RomType::Mbc3TimerRamBattery
                | RomType::Mbc3RamBattery
                | RomType::Mbc5RamBattery
                | RomType::Mbc5RumbleRamBattery
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(
            self.rom_type(),
            RomType::Mbc3TimerBattery | RomType::Mbc3TimerRamBattery
        )
    }

    pub fn checksum(&self) -> u8 {
        let mut sum: u8 = 0;
        for i in 0x0134..=0x014c {
            sum = sum.wrapping_sub(self.rom_data[i]).wrapping_sub(1);
        }
        sum
    }

    pub fn valid_checksum(&self) -> bool {
        self.rom_data[0x014d] == self.checksum()
    }

    pub fn global_checksum(&self) -> u16 {
        ((self.rom_data[0x014e] as u16) << 8) | self.rom_data[0x014f] as u16
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    pub fn rom_data(&self) -> &Vec<u8> {
        &self.rom_data
    }

    pub fn ram_data(&self) -> &Vec<u8> {
        &self.ram_data
    }

    pub fn ram_data_eager(&self) -> Vec<u8> {
        self.ram_data.clone()
    }

    pub fn set_ram_data(&mut self, data: &[u8]) {
        let count = data.len().min(self.ram_data.len());
        self.ram_data[..count].copy_from_slice(&data[..count]);
    }

    pub fn clear_ram_data(&mut self) {
        self.ram_data = vec![0u8; self.ram_data.len()];
    }

    pub fn rom_path(&self) -> Option<&str> {
        self.rom_path.as_deref()
    }

    pub fn set_rom_path(&mut self, path: &str) {
        self.rom_path = Some(String::from(path));
    }

    pub fn description(&self, column_length: usize) -> String {
        let title_l = format!("{:width$}", "Title", width = column_length);
        let region_l = format!("{:width$}", "Region", width = column_length);
        let type_l = format!("{:width$}", "Type", width = column_length);
        let rom_size_l = format!("{:width$}", "ROM Size", width = column_length);
        let ram_size_l = format!("{:width$}", "RAM Size", width = column_length);
        let cgb_l = format!("{:width$}", "CGB Mode", width = column_length);
        format!(
            "{}  {}\n{}  {}\n{}  {}\n{}  {}\n{}  {}\n{}  {}",
            title_l,
            self.title(),
            region_l,
            self.region(),
            type_l,
            self.rom_type(),
            rom_size_l,
            self.rom_size(),
            ram_size_l,
            self.ram_size(),
            cgb_l,
            self.cgb_flag()
        )
    }
}

impl BusComponent for Cartridge {
    fn read(&self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for Cartridge {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description(9))
    }
}

#[cfg(test)]
mod tests {
    use super::{Cartridge, Mbc, RamSize, RomSize, RomType};

    fn build_rom(rom_type: u8, rom_size: u8, ram_size: u8) -> Vec<u8> {
        let banks = 2usize << rom_size;
        let mut data = vec![0u8; banks * 0x4000];
        data[0x0147] = rom_type;
        data[0x0148] = rom_size;
        data[0x0149] = ram_size;
        // marks every bank with its own index for banking tests
        for bank in 0..banks {
            data[bank * 0x4000] = bank as u8;
        }
        data
    }

    #[test]
    fn test_header_parsing() {
        let mut data = build_rom(0x03, 0x02, 0x03);
        data[0x0134..0x0139].copy_from_slice(b"TETRA");
        let cartridge = Cartridge::from_data(&data).unwrap();

        assert_eq!(cartridge.title(), "TETRA");
        assert_eq!(cartridge.rom_type(), RomType::Mbc1RamBattery);
        assert_eq!(cartridge.rom_size(), RomSize::Size128K);
        assert_eq!(cartridge.ram_size(), RamSize::Size32K);
        assert!(cartridge.has_battery());
    }

    #[test]
    fn test_unknown_mbc() {
        let data = build_rom(0xfe, 0x00, 0x00);
        assert!(Cartridge::from_data(&data).is_err());
    }

    #[test]
    fn test_too_small() {
        let data = vec![0u8; 0x100];
        assert!(Cartridge::from_data(&data).is_err());
    }

    #[test]
    fn test_mbc1_banking() {
        let data = build_rom(0x01, 0x02, 0x00);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        // bank 0 is coerced to 1 on MBC1
        cartridge.write(0x2000, 0x00);
        assert_eq!(cartridge.read(0x4000), 0x01);

        cartridge.write(0x2000, 0x05);
        assert_eq!(cartridge.read(0x4000), 0x05);
        assert_eq!(cartridge.read(0x0000), 0x00);
    }

    #[test]
    fn test_mbc1_ram_mode0_invariant() {
        let data = build_rom(0x03, 0x00, 0x02);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        cartridge.write(0x0000, 0x0a);
        cartridge.write(0xa123, 0x42);

        // with 8 KiB of RAM and simple banking mode the RAM bank
        // selection must not affect addressing
        cartridge.write(0x4000, 0x03);
        assert_eq!(cartridge.read(0xa123), 0x42);

        cartridge.write(0x0000, 0x00);
        assert_eq!(cartridge.read(0xa123), 0xff);
    }

    #[test]
    fn test_mbc2_nibble_ram() {
        let data = build_rom(0x06, 0x01, 0x00);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        // address bit 8 clear selects the RAM enable latch
        cartridge.write(0x0000, 0x0a);
        cartridge.write(0xa000, 0xff);
        assert_eq!(cartridge.read(0xa000), 0xff);

        cartridge.write(0xa001, 0x05);
        assert_eq!(cartridge.read(0xa001), 0xf5);

        // address bit 8 set selects the ROM bank, zero is coerced
        cartridge.write(0x0100, 0x00);
        assert_eq!(cartridge.read(0x4000), 0x01);
        cartridge.write(0x0100, 0x03);
        assert_eq!(cartridge.read(0x4000), 0x03);
    }

    #[test]
    fn test_mbc3_rtc_latch() {
        let data = build_rom(0x10, 0x02, 0x03);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        cartridge.write(0x0000, 0x0a);

        // runs the live clock for a full second plus some change
        for _ in 0..1100 {
            cartridge.clock(4096);
        }

        // the shadow registers hold the reset values until latched
        cartridge.write(0x4000, 0x08);
        assert_eq!(cartridge.read(0xa000), 0x00);

        cartridge.write(0x6000, 0x00);
        cartridge.write(0x6000, 0x01);
        assert_eq!(cartridge.read(0xa000), 0x01);
    }

    #[test]
    fn test_mbc3_rtc_halt() {
        let data = build_rom(0x0f, 0x02, 0x00);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        cartridge.write(0x0000, 0x0a);
        cartridge.write(0x4000, 0x0c);
        cartridge.write(0xa000, 0x40);

        for _ in 0..1100 {
            cartridge.clock(4096);
        }

        cartridge.write(0x6000, 0x00);
        cartridge.write(0x6000, 0x01);
        cartridge.write(0x4000, 0x08);
        assert_eq!(cartridge.read(0xa000), 0x00);
    }

    #[test]
    fn test_mbc5_bank_zero() {
        let data = build_rom(0x19, 0x02, 0x00);
        let mut cartridge = Cartridge::from_data(&data).unwrap();

        // bank 0 remains addressable on MBC5
        cartridge.write(0x2000, 0x00);
        assert_eq!(cartridge.read(0x4000), 0x00);

        cartridge.write(0x2000, 0x07);
        assert_eq!(cartridge.read(0x4000), 0x07);
    }

    #[test]
    fn test_sidecar_round_trip() {
        let data = build_rom(0x03, 0x00, 0x02);
        let rom_path = std::env::temp_dir().join("pocketboy_sidecar.gb");
        let rom_path = rom_path.to_str().unwrap();

        let mut cartridge = Cartridge::from_data(&data).unwrap();
        cartridge.set_rom_path(rom_path);
        cartridge.write(0x0000, 0x0a);
        cartridge.write(0xa000, 0x99);
        cartridge.save_sram_file().unwrap();

        let mut other = Cartridge::from_data(&data).unwrap();
        other.set_rom_path(rom_path);
        other.load_sram_file().unwrap();
        assert_eq!(other.ram_data(), cartridge.ram_data());

        std::fs::remove_file(format!("{}.sram", rom_path)).unwrap();
    }

    #[test]
    fn test_mbc_description() {
        let data = build_rom(0x11, 0x02, 0x00);
        let cartridge = Cartridge::from_data(&data).unwrap();
        assert!(matches!(cartridge.mbc(), Mbc::Mbc3 { .. }));
        assert_eq!(cartridge.mbc().description(), "MBC3");
    }
}
