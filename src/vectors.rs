//! JSON driven per-opcode micro test runner.
//!
//! Each vector forces the CPU to execute a single opcode against a
//! flat 64 KiB memory, comparing the resulting register file, the
//! touched memory bytes and the complete sequence of bus accesses
//! against the expectations carried in the vector. Vectors can be
//! embedded as strings or loaded from JSON files on disk.

use pocketboy_common::error::Error;
use serde::Deserialize;
use std::{fs, path::Path};

use crate::{
    cpu::Cpu,
    mmu::{BusAccess, BusAccessKind},
};

/// Name of the environment variable pointing to a directory of
/// vector files to be replayed by the test suite.
pub const VECTORS_DIR_ENV: &str = "POCKETBOY_VECTORS_DIR";

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorAccess {
    Read,
    Write,
    Internal,
}

/// One M-cycle of the opcode under test, either a bus transaction
/// (with address and byte) or an internal cycle.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct VectorCycle {
    #[serde(default)]
    pub addr: Option<u16>,
    #[serde(default)]
    pub byte: Option<u8>,
    pub access: VectorAccess,
}

/// The register file and the relevant memory bytes at one of the
/// two ends of a vector.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct VectorState {
    pub pc: u16,
    pub sp: u16,
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub f: u8,
    pub h: u8,
    pub l: u8,
    pub ram: Vec<(u16, u8)>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OpcodeVector {
    pub name: String,
    pub initial: VectorState,
    #[serde(rename = "final")]
    pub final_state: VectorState,
    pub cycles: Vec<VectorCycle>,
}

/// Replays a single vector, returning a descriptive error on the
/// first divergence found.
pub fn run_vector(vector: &OpcodeVector) -> Result<(), Error> {
    let mut cpu = Cpu::default();
    cpu.mmu().set_flat_enabled(true);

    cpu.pc = vector.initial.pc;
    cpu.sp = vector.initial.sp;
    cpu.a = vector.initial.a;
    cpu.b = vector.initial.b;
    cpu.c = vector.initial.c;
    cpu.d = vector.initial.d;
    cpu.e = vector.initial.e;
    cpu.h = vector.initial.h;
    cpu.l = vector.initial.l;
    cpu.set_f(vector.initial.f);

    for &(addr, byte) in &vector.initial.ram {
        cpu.mmu().write(addr, byte);
    }

    cpu.mmu().set_trace_enabled(true);
    let cycles = cpu.clock() as usize;
    let trace = cpu.mmu().take_trace();
    cpu.mmu().set_trace_enabled(false);

    let expected_cycles = vector.cycles.len() * 4;
    if cycles != expected_cycles {
        return Err(Error::CustomError(format!(
            "{}: expected {} T-cycles, got {}",
            vector.name, expected_cycles, cycles
        )));
    }

    let expected = expected_accesses(vector)?;
    if trace != expected {
        return Err(Error::CustomError(format!(
            "{}: bus activity mismatch, expected {:?}, got {:?}",
            vector.name, expected, trace
        )));
    }

    verify_register(&vector.name, "pc", cpu.pc as u32, vector.final_state.pc as u32)?;
    verify_register(&vector.name, "sp", cpu.sp as u32, vector.final_state.sp as u32)?;
    verify_register(&vector.name, "a", cpu.a as u32, vector.final_state.a as u32)?;
    verify_register(&vector.name, "b", cpu.b as u32, vector.final_state.b as u32)?;
    verify_register(&vector.name, "c", cpu.c as u32, vector.final_state.c as u32)?;
    verify_register(&vector.name, "d", cpu.d as u32, vector.final_state.d as u32)?;
    verify_register(&vector.name, "e", cpu.e as u32, vector.final_state.e as u32)?;
    verify_register(&vector.name, "h", cpu.h as u32, vector.final_state.h as u32)?;
    verify_register(&vector.name, "l", cpu.l as u32, vector.final_state.l as u32)?;
    verify_register(
        &vector.name,
        "f",
        cpu.f() as u32,
        (vector.final_state.f & 0xf0) as u32,
    )?;

    for &(addr, byte) in &vector.final_state.ram {
        let value = cpu.mmu().read(addr);
        if value != byte {
            return Err(Error::CustomError(format!(
                "{}: memory mismatch at 0x{:04x}, expected 0x{:02x}, got 0x{:02x}",
                vector.name, addr, byte, value
            )));
        }
    }

    Ok(())
}

/// Replays the complete set of vectors contained in the provided
/// JSON string, returning the number of vectors that were run.
pub fn run_vectors(data: &str) -> Result<usize, Error> {
    let vectors: Vec<OpcodeVector> =
        serde_json::from_str(data).map_err(|error| Error::CustomError(error.to_string()))?;
    for vector in &vectors {
        run_vector(vector)?;
    }
    Ok(vectors.len())
}

pub fn run_vectors_file(path: &str) -> Result<usize, Error> {
    let data = fs::read_to_string(path)
        .map_err(|_| Error::CustomError(format!("Failed to read file: {}", path)))?;
    run_vectors(&data)
}

/// Replays every `.json` vector file found in the provided
/// directory, returning the total number of vectors run.
pub fn run_vectors_dir(path: &str) -> Result<usize, Error> {
    let mut count = 0;
    let entries = fs::read_dir(path)
        .map_err(|_| Error::CustomError(format!("Failed to read directory: {}", path)))?;
    for entry in entries {
        let entry = entry.map_err(|error| Error::CustomError(error.to_string()))?;
        let file_path = entry.path();
        if file_path.extension().map(|ext| ext == "json") != Some(true) {
            continue;
        }
        count += run_vectors_file(path_str(&file_path)?)?;
    }
    Ok(count)
}

fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str().ok_or(Error::InvalidData)
}

/// Extracts the expected bus transactions from the cycle list of
/// a vector, internal cycles produce no bus activity.
fn expected_accesses(vector: &OpcodeVector) -> Result<Vec<BusAccess>, Error> {
    let mut accesses = vec![];
    for cycle in &vector.cycles {
        let kind = match cycle.access {
            VectorAccess::Internal => continue,
            VectorAccess::Read => BusAccessKind::Read,
            VectorAccess::Write => BusAccessKind::Write,
        };
        let addr = cycle.addr.ok_or(Error::InvalidData)?;
        let value = cycle.byte.ok_or(Error::InvalidData)?;
        accesses.push(BusAccess { addr, value, kind });
    }
    Ok(accesses)
}

fn verify_register(name: &str, register: &str, value: u32, expected: u32) -> Result<(), Error> {
    if value != expected {
        return Err(Error::CustomError(format!(
            "{}: register {} mismatch, expected 0x{:04x}, got 0x{:04x}",
            name, register, expected, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::{run_vectors, run_vectors_dir, VECTORS_DIR_ENV};

    /// Small set of hand written vectors exercising plain fetches,
    /// operand reads, memory writes, stack pushes and internal
    /// cycles of taken branches.
    const SAMPLE_VECTORS: &str = r#"[
        {
            "name": "00 nop",
            "initial": { "pc": 49152 },
            "final": { "pc": 49153 },
            "cycles": [
                { "addr": 49152, "byte": 0, "access": "read" }
            ]
        },
        {
            "name": "3e ld a, u8",
            "initial": { "pc": 49152, "ram": [[49152, 62], [49153, 66]] },
            "final": { "pc": 49154, "a": 66, "ram": [[49152, 62]] },
            "cycles": [
                { "addr": 49152, "byte": 62, "access": "read" },
                { "addr": 49153, "byte": 66, "access": "read" }
            ]
        },
        {
            "name": "77 ld [hl], a",
            "initial": { "pc": 49152, "a": 153, "h": 208, "l": 0, "ram": [[49152, 119]] },
            "final": { "pc": 49153, "a": 153, "h": 208, "l": 0, "ram": [[53248, 153]] },
            "cycles": [
                { "addr": 49152, "byte": 119, "access": "read" },
                { "addr": 53248, "byte": 153, "access": "write" }
            ]
        },
        {
            "name": "18 jr i8",
            "initial": { "pc": 49152, "ram": [[49152, 24], [49153, 5]] },
            "final": { "pc": 49159 },
            "cycles": [
                { "addr": 49152, "byte": 24, "access": "read" },
                { "addr": 49153, "byte": 5, "access": "read" },
                { "access": "internal" }
            ]
        },
        {
            "name": "c5 push bc",
            "initial": { "pc": 49152, "sp": 57328, "b": 18, "c": 52, "ram": [[49152, 197]] },
            "final": { "pc": 49153, "sp": 57326, "b": 18, "c": 52, "ram": [[57327, 18], [57326, 52]] },
            "cycles": [
                { "addr": 49152, "byte": 197, "access": "read" },
                { "access": "internal" },
                { "addr": 57327, "byte": 18, "access": "write" },
                { "addr": 57326, "byte": 52, "access": "write" }
            ]
        }
    ]"#;

    #[test]
    fn test_embedded_vectors() {
        let count = run_vectors(SAMPLE_VECTORS).unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_cycle_mismatch_fails() {
        let broken = r#"[
            {
                "name": "00 nop with wrong timing",
                "initial": { "pc": 49152 },
                "final": { "pc": 49153 },
                "cycles": [
                    { "addr": 49152, "byte": 0, "access": "read" },
                    { "access": "internal" }
                ]
            }
        ]"#;
        assert!(run_vectors(broken).is_err());
    }

    #[test]
    fn test_state_mismatch_fails() {
        let broken = r#"[
            {
                "name": "00 nop with wrong final state",
                "initial": { "pc": 49152 },
                "final": { "pc": 49153, "a": 1 },
                "cycles": [
                    { "addr": 49152, "byte": 0, "access": "read" }
                ]
            }
        ]"#;
        assert!(run_vectors(broken).is_err());
    }

    #[test]
    fn test_external_vectors() {
        // replays external vector files only when a directory has
        // been provided through the environment
        let Ok(dir) = env::var(VECTORS_DIR_ENV) else {
            return;
        };
        run_vectors_dir(&dir).unwrap();
    }
}
