//! Game Boy emulation entrypoint and associated functions and structures.
//!
//! Most of the meaningful publicly available functions and structures to build
//! a working emulator should be present here.
//!
//! # Examples
//!
//! Creates a simple [`GameBoy`] instance, loads an empty cartridge and
//! runs a complete frame worth of emulation.
//!
//! ```rust
//! use pocketboy::gb::GameBoy;
//! let mut game_boy = GameBoy::new();
//! game_boy.load_rom(&[0u8; 32 * 1024], None).unwrap();
//! game_boy.boot();
//! let cycles = game_boy.run_for_frames(1);
//! println!("Ran {} cycles", cycles);
//! ```

use pocketboy_common::{error::Error, util::read_file};
use std::fmt::{self, Display, Formatter};

use crate::{
    apu::{Apu, SampleCallback},
    cpu::Cpu,
    dma::Dma,
    info::Info,
    mmu::{Mmu, BOOT_SIZE},
    pad::{Pad, PadKey, PadState},
    ppu::{Palette, Ppu, PpuMode, DISPLAY_HEIGHT, DISPLAY_WIDTH, FRAME_BUFFER_SIZE},
    rom::{Cartridge, CgbMode},
    timer::Timer,
};

/// Aggregation structure allowing the bundling of
/// all the components of a GameBoy into a single
/// element for easy access.
pub struct Components {
    pub ppu: Ppu,
    pub apu: Apu,
    pub dma: Dma,
    pub pad: Pad,
    pub timer: Timer,
}

impl Default for Components {
    fn default() -> Self {
        Self {
            ppu: Ppu::default(),
            apu: Apu::default(),
            dma: Dma::default(),
            pad: Pad::default(),
            timer: Timer::default(),
        }
    }
}

pub struct Registers {
    pub pc: u16,
    pub sp: u16,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub scy: u8,
    pub scx: u8,
    pub wy: u8,
    pub wx: u8,
    pub ly: u8,
    pub lyc: u8,
}

/// Top level structure that abstracts the usage of the
/// Game Boy system under the Pocketboy emulator.
///
/// Should serve as the main entry-point API.
pub struct GameBoy {
    /// Reference to the Game Boy CPU component to be
    /// used as the main element of the system, when
    /// clocked, the amount of ticks from it will be
    /// used as reference for the rest of the components.
    cpu: Cpu,

    /// Flag that indicates if a boot ROM image has been
    /// loaded into the system, controls if a reset can
    /// re-engage the boot overlay.
    boot_rom_loaded: bool,

    /// Number of T-cycles executed within the frame that is
    /// currently in progress, used by the frame oriented
    /// run loop.
    frame_cycles: u32,
}

impl GameBoy {
    /// The logic frequency of the Game Boy
    /// CPU in hz.
    pub const CPU_FREQ: u32 = 4194304;

    /// The visual frequency (refresh rate)
    /// of the Game Boy, close to 60 hz.
    pub const VISUAL_FREQ: f32 = 59.7275;

    /// The cycles taken to run a complete frame
    /// loop in the Game Boy's PPU (in CPU cycles).
    pub const CYCLES_PER_FRAME: u32 = 70224;

    pub fn new() -> Self {
        let components = Components::default();
        let mmu = Mmu::new(components);
        let cpu = Cpu::new(mmu);

        Self {
            cpu,
            boot_rom_loaded: false,
            frame_cycles: 0,
        }
    }

    pub fn verify_rom(data: &[u8]) -> bool {
        Cartridge::from_data(data).is_ok()
    }

    /// Resets the complete system, optionally skipping the boot
    /// sequence by seeding the post boot state. When a boot ROM has
    /// been loaded and the boot is not skipped the overlay is
    /// re-engaged and execution restarts at address zero.
    pub fn reset(&mut self, skip_boot: bool) {
        self.ppu().reset();
        self.apu().reset();
        self.timer().reset();
        self.pad().reset();
        self.dma().reset();
        self.mmu().reset();
        self.cpu.reset();
        self.mmu().rom().reset_banks();
        self.frame_cycles = 0;

        if skip_boot || !self.boot_rom_loaded {
            self.boot();
        } else {
            self.mmu().set_boot_active(true);
        }
    }

    /// Direct boot method that immediately jumps the machine
    /// to the post boot state, this will effectively skip the
    /// boot sequence and jump to the cartridge execution.
    pub fn boot(&mut self) {
        self.cpu.boot();
    }

    /// Advances the system by one CPU step, either one instruction
    /// or one interrupt service sequence, the peripherals are kept
    /// in lock-step by the bus. Returns the number of T-cycles that
    /// have been consumed.
    pub fn clock(&mut self) -> u8 {
        self.cpu.clock()
    }

    /// Runs the system until at least the provided number of
    /// T-cycles have elapsed, returning the effective number of
    /// cycles run. Returns early if the CPU freezes.
    pub fn run_for_cycles(&mut self, cycles: u64) -> u64 {
        let mut total = 0u64;
        while total < cycles && !self.cpu.stopped() {
            total += self.clock() as u64;
        }
        total
    }

    /// Runs the system for the provided number of frames worth of
    /// T-cycles, the frame remainder is carried into the next call
    /// so that long runs stay aligned with the display timing.
    pub fn run_for_frames(&mut self, frames: u32) -> u64 {
        let mut total = 0u64;
        for _ in 0..frames {
            while self.frame_cycles < Self::CYCLES_PER_FRAME && !self.cpu.stopped() {
                let cycles = self.clock() as u32;
                self.frame_cycles += cycles;
                total += cycles as u64;
            }
            if self.frame_cycles >= Self::CYCLES_PER_FRAME {
                self.frame_cycles -= Self::CYCLES_PER_FRAME;
            }
            if self.cpu.stopped() {
                break;
            }
        }
        total
    }

    /// Clocks the system until the PC (Program Counter) reaches the
    /// provided address, returning the cycles spent.
    pub fn step_to(&mut self, addr: u16) -> u32 {
        let mut cycles = 0u32;
        while self.cpu.pc() != addr && !self.cpu.stopped() {
            cycles += self.clock() as u32;
        }
        cycles
    }

    pub fn key_press(&mut self, key: PadKey) {
        self.pad().key_press(key);
    }

    pub fn key_lift(&mut self, key: PadKey) {
        self.pad().key_lift(key);
    }

    /// Pushes a complete snapshot of the button matrix into the
    /// system, to be called by the host before running.
    pub fn set_pad(&mut self, state: PadState) {
        self.pad().set_state(state);
    }

    /// Writes the complete cartridge RAM into the SRAM sidecar
    /// file associated with the loaded ROM file.
    pub fn save_sram(&mut self) -> Result<(), Error> {
        self.mmu().rom().save_sram_file()
    }

    /// Registers the host audio callback, invoked with a new
    /// [`crate::apu::SampleResult`] every `period` T-cycles.
    pub fn set_sample_callback(&mut self, period: u32, callback: SampleCallback) {
        self.apu().set_sample_callback(period, callback);
    }

    /// Sets the four colors used in the resolution of the DMG
    /// palettes into frame buffer pixels.
    pub fn set_palette_colors(&mut self, value: &Palette) {
        self.ppu().set_palette_colors(value);
    }

    pub fn ppu_ly(&self) -> u8 {
        self.ppu_i().ly()
    }

    pub fn ppu_mode(&self) -> PpuMode {
        self.ppu_i().mode()
    }

    pub fn ppu_frame(&self) -> u16 {
        self.ppu_i().frame_index()
    }

    pub fn registers(&self) -> Registers {
        let ppu_registers = self.ppu_i().registers();
        Registers {
            pc: self.cpu.pc,
            sp: self.cpu.sp,
            a: self.cpu.a,
            b: self.cpu.b,
            c: self.cpu.c,
            d: self.cpu.d,
            e: self.cpu.e,
            h: self.cpu.h,
            l: self.cpu.l,
            scy: ppu_registers.scy,
            scx: ppu_registers.scx,
            wy: ppu_registers.wy,
            wx: ppu_registers.wx,
            ly: ppu_registers.ly,
            lyc: ppu_registers.lyc,
        }
    }

    pub fn display_width(&self) -> usize {
        DISPLAY_WIDTH
    }

    pub fn display_height(&self) -> usize {
        DISPLAY_HEIGHT
    }

    pub fn description(&self, column_length: usize) -> String {
        let version_l = format!("{:width$}", "Version", width = column_length);
        let clock_l = format!("{:width$}", "Clock", width = column_length);
        format!(
            "{}  {}\n{}  {:.02} Mhz",
            version_l,
            Info::version(),
            clock_l,
            Self::CPU_FREQ as f32 / 1000.0 / 1000.0
        )
    }
}

/// Gameboy implementations that are meant with performance
/// in mind, access to the internal components and the loading
/// operations.
impl GameBoy {
    pub fn cpu(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn cpu_i(&self) -> &Cpu {
        &self.cpu
    }

    pub fn mmu(&mut self) -> &mut Mmu {
        self.cpu.mmu()
    }

    pub fn mmu_i(&self) -> &Mmu {
        self.cpu.mmu_i()
    }

    pub fn ppu(&mut self) -> &mut Ppu {
        self.cpu.mmu().ppu()
    }

    pub fn ppu_i(&self) -> &Ppu {
        self.cpu.mmu_i().ppu_i()
    }

    pub fn apu(&mut self) -> &mut Apu {
        self.cpu.mmu().apu()
    }

    pub fn apu_i(&self) -> &Apu {
        self.cpu.mmu_i().apu_i()
    }

    pub fn dma(&mut self) -> &mut Dma {
        self.cpu.mmu().dma()
    }

    pub fn dma_i(&self) -> &Dma {
        self.cpu.mmu_i().dma_i()
    }

    pub fn pad(&mut self) -> &mut Pad {
        self.cpu.mmu().pad()
    }

    pub fn pad_i(&self) -> &Pad {
        self.cpu.mmu_i().pad_i()
    }

    pub fn timer(&mut self) -> &mut Timer {
        self.cpu.mmu().timer()
    }

    pub fn timer_i(&self) -> &Timer {
        self.cpu.mmu_i().timer_i()
    }

    pub fn rom(&mut self) -> &mut Cartridge {
        self.mmu().rom()
    }

    pub fn rom_i(&self) -> &Cartridge {
        self.mmu_i().rom_i()
    }

    /// The completed frame buffer, in RGBA format, safe to be read
    /// by the host until the next V-Blank boundary.
    pub fn frame_buffer(&self) -> &[u8; FRAME_BUFFER_SIZE] {
        self.ppu_i().frame_buffer()
    }

    /// Loads a cartridge from the provided ROM data, optionally
    /// seeding the cartridge RAM. CGB only cartridges are rejected
    /// as the system emulates the original DMG device.
    pub fn load_rom(
        &mut self,
        data: &[u8],
        ram_data: Option<&[u8]>,
    ) -> Result<&mut Cartridge, Error> {
        let mut rom = Cartridge::from_data(data)?;
        if rom.cgb_flag() == CgbMode::CgbOnly {
            return Err(Error::CustomError(String::from(
                "CGB only cartridges are not supported",
            )));
        }
        if let Some(ram_data) = ram_data {
            rom.set_ram_data(ram_data)
        }
        self.mmu().set_rom(rom);
        Ok(self.mmu().rom())
    }

    /// Loads a cartridge from the provided file path, trying to
    /// populate the cartridge RAM from the SRAM sidecar file in
    /// case one exists next to the ROM file.
    pub fn load_rom_file(&mut self, path: &str) -> Result<&mut Cartridge, Error> {
        let data = read_file(path)?;
        let rom = self.load_rom(&data, None)?;
        rom.set_rom_path(path);
        rom.load_sram_file()?;
        Ok(rom)
    }

    /// Loads the provided boot ROM image (256 bytes), engaging the
    /// boot overlay so that execution starts from address zero.
    pub fn load_boot(&mut self, data: &[u8]) -> Result<(), Error> {
        if data.len() != BOOT_SIZE {
            return Err(Error::IncompatibleBootRom);
        }
        self.mmu().write_boot(0x0000, data);
        self.mmu().set_boot_active(true);
        self.boot_rom_loaded = true;
        Ok(())
    }

    pub fn load_boot_path(&mut self, path: &str) -> Result<(), Error> {
        let data = read_file(path)?;
        self.load_boot(&data)
    }

    pub fn boot_rom_loaded(&self) -> bool {
        self.boot_rom_loaded
    }

    pub fn read_memory(&mut self, addr: u16) -> u8 {
        self.mmu().read(addr)
    }

    pub fn write_memory(&mut self, addr: u16, value: u8) {
        self.mmu().write(addr, value);
    }

    pub fn set_ppu_enabled(&mut self, value: bool) {
        self.mmu().set_ppu_enabled(value);
    }

    pub fn set_apu_enabled(&mut self, value: bool) {
        self.mmu().set_apu_enabled(value);
    }

    pub fn set_timer_enabled(&mut self, value: bool) {
        self.mmu().set_timer_enabled(value);
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GameBoy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description(9))
    }
}
