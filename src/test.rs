//! Test related utilities and the end-to-end scenarios of the
//! emulation core.

use pocketboy_common::error::Error;

use crate::gb::GameBoy;

#[derive(Default)]
pub struct TestOptions {
    pub ppu_enabled: Option<bool>,
    pub apu_enabled: Option<bool>,
    pub timer_enabled: Option<bool>,
}

pub fn build_test(options: TestOptions) -> Box<GameBoy> {
    let mut game_boy = Box::new(GameBoy::new());
    game_boy.set_ppu_enabled(options.ppu_enabled.unwrap_or(true));
    game_boy.set_apu_enabled(options.apu_enabled.unwrap_or(true));
    game_boy.set_timer_enabled(options.timer_enabled.unwrap_or(true));
    game_boy
}

/// Builds a plain 32 KiB ROM image with the provided code placed
/// at the cartridge entry point (0x0100).
pub fn build_rom(entry: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 32 * 1024];
    data[0x0100..0x0100 + entry.len()].copy_from_slice(entry);
    data
}

pub fn run_test(
    rom_data: &[u8],
    max_cycles: Option<u64>,
    options: TestOptions,
) -> Result<Box<GameBoy>, Error> {
    let max_cycles = max_cycles.unwrap_or(u64::MAX);
    let mut game_boy = build_test(options);
    game_boy.load_rom(rom_data, None)?;
    game_boy.boot();
    game_boy.run_for_cycles(max_cycles);
    Ok(game_boy)
}

#[cfg(test)]
mod tests {
    use pocketboy_common::util::SharedMut;
    use std::{cell::RefCell, rc::Rc};

    use crate::{
        apu::SampleResult,
        consts::{IF_ADDR, TAC_ADDR, TIMA_ADDR, TMA_ADDR},
        gb::GameBoy,
    };

    use super::{build_rom, build_test, run_test, TestOptions};

    #[test]
    fn test_boot_state() {
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&build_rom(&[]), None).unwrap();
        game_boy.boot();

        assert_eq!(game_boy.cpu_i().pc(), 0x0100);
        assert_eq!(game_boy.cpu_i().sp(), 0xfffe);
        assert_eq!(game_boy.cpu_i().af(), 0x01b0);
        assert_eq!(game_boy.cpu_i().bc(), 0x0013);
        assert_eq!(game_boy.cpu_i().de(), 0x00d8);
        assert_eq!(game_boy.cpu_i().hl(), 0x014d);
        assert!(!game_boy.cpu_i().ime());

        assert_eq!(game_boy.read_memory(0xff40), 0x91);
        assert_eq!(game_boy.read_memory(0xff47), 0xfc);
    }

    #[test]
    fn test_entry_loop() {
        // LD A, 0x42 followed by JP 0x0100, the program keeps
        // looping over the entry point
        let rom = build_rom(&[0x3e, 0x42, 0xc3, 0x00, 0x01]);
        let game_boy = run_test(&rom, Some(16), TestOptions::default()).unwrap();

        assert_eq!(game_boy.cpu_i().a, 0x42);
        assert_eq!(game_boy.cpu_i().pc(), 0x0100);

        let mut game_boy = game_boy;
        game_boy.clock();
        assert_eq!(game_boy.cpu_i().pc(), 0x0102);
        game_boy.clock();
        assert_eq!(game_boy.cpu_i().pc(), 0x0100);
    }

    #[test]
    fn test_frame_timing_bound() {
        let rom = build_rom(&[0x18, 0xfe]);
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&rom, None).unwrap();
        game_boy.boot();

        let cycles = game_boy.run_for_frames(1);
        assert!(cycles >= GameBoy::CYCLES_PER_FRAME as u64);
        assert!(cycles < GameBoy::CYCLES_PER_FRAME as u64 + 24);
        assert!(game_boy.ppu_frame() >= 1);
    }

    #[test]
    fn test_timer_interrupt_flag() {
        let rom = build_rom(&[0x18, 0xfe]);
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&rom, None).unwrap();
        game_boy.boot();

        game_boy.write_memory(0xff04, 0x00);
        game_boy.write_memory(TAC_ADDR, 0x05);
        game_boy.write_memory(TIMA_ADDR, 0xfe);
        game_boy.write_memory(TMA_ADDR, 0x00);

        game_boy.run_for_cycles(32);
        assert_eq!(game_boy.read_memory(IF_ADDR) & 0x04, 0x04);
        assert_eq!(game_boy.read_memory(TIMA_ADDR), 0x00);
    }

    #[test]
    fn test_oam_dma_program() {
        // LD A, 0xC0 followed by LDH [0x46], A, triggering an OAM
        // DMA transfer from 0xC000
        let rom = build_rom(&[0x3e, 0xc0, 0xe0, 0x46]);
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&rom, None).unwrap();
        game_boy.boot();

        for index in 0..160u16 {
            game_boy.write_memory(0xc000 + index, 0xaa);
        }

        game_boy.clock();
        game_boy.clock();

        for index in 0..160u16 {
            assert_eq!(game_boy.read_memory(0xfe00 + index), 0xaa);
        }
    }

    #[test]
    fn test_channel1_produces_sound() {
        let samples: SharedMut<Vec<SampleResult>> = Rc::new(RefCell::new(vec![]));
        let samples_ref = samples.clone();

        let rom = build_rom(&[0x18, 0xfe]);
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&rom, None).unwrap();
        game_boy.boot();
        game_boy.set_sample_callback(
            64,
            Box::new(move |result| {
                samples_ref.borrow_mut().push(result);
            }),
        );

        game_boy.write_memory(0xff26, 0x80);
        game_boy.write_memory(0xff25, 0xff);
        game_boy.write_memory(0xff24, 0x77);
        game_boy.write_memory(0xff11, 0xbf);
        game_boy.write_memory(0xff12, 0xf0);
        game_boy.write_memory(0xff14, 0x80);

        assert_eq!(game_boy.read_memory(0xff26) & 0x01, 0x01);

        game_boy.run_for_cycles(16384);
        let samples = samples.borrow();
        assert!(!samples.is_empty());
        assert!(samples
            .iter()
            .any(|sample| sample.left.pulse1 > 0 || sample.right.pulse1 > 0));
    }

    #[test]
    fn test_reset_restores_boot_state() {
        let rom = build_rom(&[0x18, 0xfe]);
        let mut game_boy = build_test(TestOptions::default());
        game_boy.load_rom(&rom, None).unwrap();
        game_boy.boot();
        game_boy.run_for_cycles(1024);

        game_boy.reset(true);
        assert_eq!(game_boy.cpu_i().pc(), 0x0100);
        assert_eq!(game_boy.cpu_i().sp(), 0xfffe);
        assert_eq!(game_boy.mmu_i().cycles() % 4, 0);
    }
}
