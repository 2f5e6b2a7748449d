//! MMU (Memory Management Unit) functions and structures.
//!
//! The MMU owns every peripheral and performs the address decoding
//! for the complete 16 bit address space. The CPU must go through
//! [`Mmu::read_cycle`] and [`Mmu::write_cycle`] for its bus accesses,
//! which advance the shared clock by one M-cycle (four T-cycles)
//! before the access is performed, keeping every peripheral in
//! lock-step with the CPU.

use crate::{
    apu::Apu,
    consts::{BOOT_ADDR, DMA_ADDR, IE_ADDR, IF_ADDR, P1_ADDR},
    dma::Dma,
    gb::Components,
    pad::Pad,
    ppu::Ppu,
    rom::Cartridge,
    timer::Timer,
    warnln,
};

pub const BOOT_SIZE: usize = 256;
pub const RAM_SIZE: usize = 8192;

pub trait BusComponent {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, value: u8);
    fn read_many(&self, addr: u16, count: usize) -> Vec<u8> {
        (0..count)
            .map(|offset| self.read(addr + offset as u16))
            .collect()
    }
    fn write_many(&mut self, addr: u16, values: &[u8]) {
        for (offset, &value) in values.iter().enumerate() {
            self.write(addr + offset as u16, value);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusAccessKind {
    Read,
    Write,
}

/// One bus transaction as observed by the CPU, recorded by the
/// optional bus tracer (used by the opcode vector runner).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BusAccess {
    pub addr: u16,
    pub value: u8,
    pub kind: BusAccessKind,
}

pub struct Mmu {
    /// Register that controls the interrupts that are considered
    /// to be enabled and should be triggered.
    pub ie: u8,

    /// Reference to the PPU (Pixel Processing Unit) that is going
    /// to be used both for VRAM reading/writing and to forward
    /// some of the access operations.
    ppu: Ppu,

    /// Reference to the APU (Audio Processing Unit) that is going
    /// to be used both for register reading/writing and to forward
    /// some of the access operations.
    apu: Apu,

    /// Reference to the DMA controller holding the OAM DMA source
    /// register, the transfer itself is performed by the MMU.
    dma: Dma,

    /// Reference to the Gamepad structure that is going to control
    /// the I/O access to this device.
    pad: Pad,

    /// The timer controller to be used as part of the I/O access
    /// that is memory mapped.
    timer: Timer,

    /// The cartridge ROM that is currently loaded into the system,
    /// going to be used to access ROM and external RAM banks.
    rom: Cartridge,

    /// Flag that control the access to the boot section in the
    /// 0x0000-0x00FF memory area, this flag should be unset after
    /// the boot sequence has been finished.
    boot_active: bool,

    /// Buffer to be used to store the boot ROM, the code that is
    /// overlaid over the first 256 bytes of the cartridge until
    /// the first write to the boot control register.
    boot: Vec<u8>,

    /// Buffer that is used to store the work RAM of the system,
    /// mapped in range 0xC000-0xDFFF and echoed in 0xE000-0xFDFF.
    ram: Vec<u8>,

    /// Pending state of the serial interrupt bit of the IF
    /// register, the serial port itself is not modeled.
    int_serial: bool,

    /// Total number of T-cycles that have elapsed since the system
    /// was powered on, advanced by the tick operation.
    cycles: u64,

    ppu_enabled: bool,
    apu_enabled: bool,
    timer_enabled: bool,

    /// Optional flat 64 KiB memory that replaces the regular
    /// address decoding, used by the opcode vector runner to give
    /// the CPU a fully writable address space.
    flat: Option<Vec<u8>>,

    /// Optional log of the bus transactions performed by the CPU,
    /// recorded at the read/write cycle boundary.
    trace: Option<Vec<BusAccess>>,
}

impl Mmu {
    pub fn new(components: Components) -> Self {
        Self {
            ppu: components.ppu,
            apu: components.apu,
            dma: components.dma,
            pad: components.pad,
            timer: components.timer,
            rom: Cartridge::default(),
            boot_active: false,
            boot: vec![0x00; BOOT_SIZE],
            ram: vec![0x00; RAM_SIZE],
            ie: 0x0,
            int_serial: false,
            cycles: 0,
            ppu_enabled: true,
            apu_enabled: true,
            timer_enabled: true,
            flat: None,
            trace: None,
        }
    }

    /// Resets the bus owned state, the boot ROM buffer is left in
    /// place so that the overlay can be re-engaged by a reset.
    pub fn reset(&mut self) {
        self.boot_active = false;
        self.ram = vec![0x00; RAM_SIZE];
        self.ie = 0x0;
        self.int_serial = false;
        self.cycles = 0;
    }

    /// Advances every peripheral by the provided number of
    /// T-cycles, in chunks of (at most) one M-cycle, keeping the
    /// APU frame sequencer aligned with the timer edges.
    pub fn tick(&mut self, cycles: u16) {
        let mut remaining = cycles;
        while remaining > 0 {
            let step = remaining.min(4);
            self.cycles = self.cycles.wrapping_add(step as u64);
            if self.timer_enabled {
                self.timer.clock(step);
                self.drain_sequencer_ticks();
            }
            if self.ppu_enabled {
                self.ppu.clock(step);
            }
            if self.apu_enabled {
                self.apu.clock(step);
            }
            self.rom.clock(step);
            remaining -= step;
        }
    }

    /// Performs a CPU visible read, advancing the shared clock by
    /// one M-cycle before the byte is obtained.
    pub fn read_cycle(&mut self, addr: u16) -> u8 {
        self.tick(4);
        let value = self.read(addr);
        if let Some(trace) = self.trace.as_mut() {
            trace.push(BusAccess {
                addr,
                value,
                kind: BusAccessKind::Read,
            });
        }
        value
    }

    /// Performs a CPU visible write, advancing the shared clock by
    /// one M-cycle before the byte is stored.
    pub fn write_cycle(&mut self, addr: u16, value: u8) {
        self.tick(4);
        if let Some(trace) = self.trace.as_mut() {
            trace.push(BusAccess {
                addr,
                value,
                kind: BusAccessKind::Write,
            });
        }
        self.write(addr, value);
    }

    pub fn read(&self, addr: u16) -> u8 {
        if let Some(flat) = &self.flat {
            return flat[addr as usize];
        }

        match addr {
            // 0x0000-0x00FF - BOOT (256 B), while the overlay is active
            0x0000..=0x00ff if self.boot_active => self.boot[addr as usize],

            // 0x0000-0x7FFF - ROM 0 + ROM 1 (Banked) (32 KB)
            0x0000..=0x7fff => self.rom.read(addr),

            // 0x8000-0x9FFF - Graphics: VRAM (8 KB)
            0x8000..=0x9fff => self.ppu.read(addr),

            // 0xA000-0xBFFF - External RAM (8 KB)
            0xa000..=0xbfff => self.rom.read(addr),

            // 0xC000-0xDFFF - Working RAM (8 KB)
            0xc000..=0xdfff => self.ram[(addr & 0x1fff) as usize],

            // 0xE000-0xFDFF - Working RAM Shadow
            0xe000..=0xfdff => self.ram[(addr & 0x1fff) as usize],

            // 0xFE00-0xFE9F - Object attribute memory (OAM)
            0xfe00..=0xfe9f => self.ppu.read(addr),

            // 0xFEA0-0xFEFF - Not Usable
            0xfea0..=0xfeff => 0xff,

            // 0xFF00 - Joypad input
            P1_ADDR => self.pad.read(addr),

            // 0xFF01-0xFF02 - Serial data transfer (not modeled)
            0xff01..=0xff02 => 0xff,

            // 0xFF04-0xFF07 - Timer and divider
            0xff04..=0xff07 => self.timer.read(addr),

            // 0xFF0F — IF: Interrupt flag
            IF_ADDR =>
            {
                #[allow(clippy::bool_to_int_with_if)]
                (if self.ppu.int_vblank() { 0x01 } else { 0x00 }
                    | if self.ppu.int_stat() { 0x02 } else { 0x00 }
                    | if self.timer.int_tima() { 0x04 } else { 0x00 }
                    | if self.int_serial { 0x08 } else { 0x00 }
                    | if self.pad.int_pad() { 0x10 } else { 0x00 }
                    | 0xe0)
            }

            // 0xFF10-0xFF26 — Audio
            // 0xFF30-0xFF3F — Wave pattern
            0xff10..=0xff26 | 0xff30..=0xff3f => self.apu.read(addr),

            // 0xFF40-0xFF45 - PPU registers
            // 0xFF47-0xFF4B - PPU registers
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.read(addr),

            // 0xFF46 — DMA: OAM DMA source address & start
            DMA_ADDR => self.dma.read(addr),

            // 0xFF50 - Boot active flag
            BOOT_ADDR => u8::from(!self.boot_active),

            // 0xFF80-0xFFFE - High RAM (HRAM)
            0xff80..=0xfffe => self.ppu.read(addr),

            // 0xFFFF — IE: Interrupt enable
            IE_ADDR => self.ie,

            addr => {
                warnln!("Reading from unknown location 0x{:04x}", addr);
                #[allow(unreachable_code)]
                0xff
            }
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        if let Some(flat) = self.flat.as_mut() {
            flat[addr as usize] = value;
            return;
        }

        match addr {
            // 0x0000-0x00FF - BOOT (256 B), writes are ignored while
            // the overlay is active
            0x0000..=0x00ff if self.boot_active => (),

            // 0x0000-0x7FFF - MBC control registers
            0x0000..=0x7fff => self.rom.write(addr, value),

            // 0x8000-0x9FFF - Graphics: VRAM (8 KB)
            0x8000..=0x9fff => self.ppu.write(addr, value),

            // 0xA000-0xBFFF - External RAM (8 KB)
            0xa000..=0xbfff => self.rom.write(addr, value),

            // 0xC000-0xDFFF - Working RAM (8 KB)
            0xc000..=0xdfff => self.ram[(addr & 0x1fff) as usize] = value,

            // 0xE000-0xFDFF - Working RAM Shadow
            0xe000..=0xfdff => self.ram[(addr & 0x1fff) as usize] = value,

            // 0xFE00-0xFE9F - Object attribute memory (OAM)
            0xfe00..=0xfe9f => self.ppu.write(addr, value),

            // 0xFEA0-0xFEFF - Not Usable
            0xfea0..=0xfeff => {}

            // 0xFF00 - Joypad input
            P1_ADDR => self.pad.write(addr, value),

            // 0xFF01-0xFF02 - Serial data transfer (not modeled)
            0xff01..=0xff02 => (),

            // 0xFF04-0xFF07 - Timer and divider, a DIV write may
            // produce an immediate frame sequencer edge
            0xff04..=0xff07 => {
                self.timer.write(addr, value);
                self.drain_sequencer_ticks();
            }

            // 0xFF0F — IF: Interrupt flag
            IF_ADDR => {
                self.ppu.set_int_vblank(value & 0x01 == 0x01);
                self.ppu.set_int_stat(value & 0x02 == 0x02);
                self.timer.set_int_tima(value & 0x04 == 0x04);
                self.int_serial = value & 0x08 == 0x08;
                self.pad.set_int_pad(value & 0x10 == 0x10);
            }

            // 0xFF10-0xFF26 — Audio
            // 0xFF30-0xFF3F — Wave pattern
            0xff10..=0xff26 | 0xff30..=0xff3f => self.apu.write(addr, value),

            // 0xFF40-0xFF45 - PPU registers
            // 0xFF47-0xFF4B - PPU registers
            0xff40..=0xff45 | 0xff47..=0xff4b => self.ppu.write(addr, value),

            // 0xFF46 — DMA: OAM DMA source address & start, the
            // transfer is performed instantly at the write point
            DMA_ADDR => {
                self.dma.write(addr, value);
                if let Some(page) = self.dma.take_request() {
                    self.oam_dma(page);
                }
            }

            // 0xFF50 - Boot active flag, the overlay can only be
            // disabled, never re-enabled
            BOOT_ADDR => self.boot_active = false,

            // 0xFF80-0xFFFE - High RAM (HRAM)
            0xff80..=0xfffe => self.ppu.write(addr, value),

            // 0xFFFF — IE: Interrupt enable
            IE_ADDR => self.ie = value,

            addr => warnln!("Writing to unknown location 0x{:04x}", addr),
        }
    }

    /// Copies 160 bytes from the provided source page into OAM,
    /// the memory level model of the OAM DMA transfer.
    fn oam_dma(&mut self, page: u8) {
        let source = (page as u16) << 8;
        let data = self.read_many(source, 160);
        self.write_many(0xfe00, &data);
    }

    fn drain_sequencer_ticks(&mut self) {
        let ticks = self.timer.take_sequencer_ticks();
        for _ in 0..ticks {
            self.apu.clock_frame_sequencer();
        }
    }

    pub fn read_many(&self, addr: u16, count: u16) -> Vec<u8> {
        let mut data: Vec<u8> = vec![];

        for index in 0..count {
            let byte = self.read(addr + index);
            data.push(byte);
        }

        data
    }

    pub fn write_many(&mut self, addr: u16, data: &[u8]) {
        for (index, byte) in data.iter().enumerate() {
            self.write(addr + index as u16, *byte)
        }
    }

    pub fn write_boot(&mut self, addr: u16, buffer: &[u8]) {
        self.boot[addr as usize..addr as usize + buffer.len()].clone_from_slice(buffer);
    }

    pub fn ppu(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn ppu_i(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn apu_i(&self) -> &Apu {
        &self.apu
    }

    pub fn dma(&mut self) -> &mut Dma {
        &mut self.dma
    }

    pub fn dma_i(&self) -> &Dma {
        &self.dma
    }

    pub fn pad(&mut self) -> &mut Pad {
        &mut self.pad
    }

    pub fn pad_i(&self) -> &Pad {
        &self.pad
    }

    pub fn timer(&mut self) -> &mut Timer {
        &mut self.timer
    }

    pub fn timer_i(&self) -> &Timer {
        &self.timer
    }

    pub fn rom(&mut self) -> &mut Cartridge {
        &mut self.rom
    }

    pub fn rom_i(&self) -> &Cartridge {
        &self.rom
    }

    pub fn set_rom(&mut self, rom: Cartridge) {
        self.rom = rom;
    }

    pub fn boot_active(&self) -> bool {
        self.boot_active
    }

    pub fn set_boot_active(&mut self, value: bool) {
        self.boot_active = value;
    }

    pub fn ram(&mut self) -> &mut Vec<u8> {
        &mut self.ram
    }

    pub fn ram_i(&self) -> &Vec<u8> {
        &self.ram
    }

    #[inline(always)]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[inline(always)]
    pub fn int_serial(&self) -> bool {
        self.int_serial
    }

    #[inline(always)]
    pub fn set_int_serial(&mut self, value: bool) {
        self.int_serial = value;
    }

    #[inline(always)]
    pub fn ack_serial(&mut self) {
        self.set_int_serial(false);
    }

    pub fn ppu_enabled(&self) -> bool {
        self.ppu_enabled
    }

    pub fn set_ppu_enabled(&mut self, value: bool) {
        self.ppu_enabled = value;
    }

    pub fn apu_enabled(&self) -> bool {
        self.apu_enabled
    }

    pub fn set_apu_enabled(&mut self, value: bool) {
        self.apu_enabled = value;
    }

    pub fn timer_enabled(&self) -> bool {
        self.timer_enabled
    }

    pub fn set_timer_enabled(&mut self, value: bool) {
        self.timer_enabled = value;
    }

    /// Engages (or disengages) the flat memory that overrides the
    /// regular address decoding, to be used by test runners that
    /// require a fully writable 64 KiB address space.
    pub fn set_flat_enabled(&mut self, value: bool) {
        self.flat = if value {
            Some(vec![0x00; 0x10000])
        } else {
            None
        };
    }

    /// Starts (or stops) the recording of the CPU visible bus
    /// transactions.
    pub fn set_trace_enabled(&mut self, value: bool) {
        self.trace = if value { Some(vec![]) } else { None };
    }

    /// Returns the bus transactions recorded since tracing was
    /// enabled (or since the last call), keeping tracing active.
    pub fn take_trace(&mut self) -> Vec<BusAccess> {
        match self.trace.as_mut() {
            Some(trace) => std::mem::take(trace),
            None => vec![],
        }
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Mmu::new(Components::default())
    }
}

#[cfg(test)]
mod tests {
    use crate::consts::{DIV_ADDR, DMA_ADDR, IF_ADDR};

    use super::Mmu;

    #[test]
    fn test_echo_ram() {
        let mut mmu = Mmu::default();
        mmu.write(0xe000, 0x12);
        assert_eq!(mmu.read(0xc000), 0x12);

        mmu.write(0xdfff, 0x34);
        assert_eq!(mmu.read(0xfdff), 0x34);
    }

    #[test]
    fn test_unused_region() {
        let mut mmu = Mmu::default();
        mmu.write(0xfea0, 0x77);
        assert_eq!(mmu.read(0xfea0), 0xff);
    }

    #[test]
    fn test_tick_advances_counter() {
        let mut mmu = Mmu::default();
        mmu.tick(12);
        assert_eq!(mmu.cycles(), 12);
        assert_eq!(mmu.timer_i().div_cycles(), 12);
    }

    #[test]
    fn test_oam_dma() {
        let mut mmu = Mmu::default();
        for index in 0..160u16 {
            mmu.write(0xc000 + index, 0xaa);
        }

        mmu.write(DMA_ADDR, 0xc0);
        for index in 0..160u16 {
            assert_eq!(mmu.read(0xfe00 + index), 0xaa);
        }
        assert_eq!(mmu.read(DMA_ADDR), 0xc0);
    }

    #[test]
    fn test_interrupt_flag_masks() {
        let mut mmu = Mmu::default();
        assert_eq!(mmu.read(IF_ADDR), 0xe0);

        mmu.write(IF_ADDR, 0x1f);
        assert_eq!(mmu.read(IF_ADDR), 0xff);

        mmu.write(IF_ADDR, 0x00);
        assert_eq!(mmu.read(IF_ADDR), 0xe0);
    }

    #[test]
    fn test_div_reset_through_bus() {
        let mut mmu = Mmu::default();
        mmu.tick(1024);
        assert_ne!(mmu.read(DIV_ADDR), 0x00);

        mmu.write(DIV_ADDR, 0x99);
        assert_eq!(mmu.read(DIV_ADDR), 0x00);
    }

    #[test]
    fn test_flat_memory() {
        let mut mmu = Mmu::default();
        mmu.set_flat_enabled(true);
        mmu.write(0x0000, 0x42);
        assert_eq!(mmu.read(0x0000), 0x42);
        mmu.write(0xffff, 0x24);
        assert_eq!(mmu.read(0xffff), 0x24);
    }
}
