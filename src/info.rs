//! General information about the crate and the emulator.

use pocketboy_common::util::capitalize;

pub struct Info;

impl Info {
    /// Obtains the name of the emulator.
    pub fn name() -> String {
        capitalize(env!("CARGO_PKG_NAME"))
    }

    /// Obtains the name of the emulator in lowercase.
    /// Useful for file paths and other cases where
    /// case sensitivity matters.
    pub fn name_lower() -> String {
        String::from(env!("CARGO_PKG_NAME"))
    }

    /// Obtains the version of the emulator.
    pub fn version() -> String {
        String::from(env!("CARGO_PKG_VERSION"))
    }

    /// Obtains the system this emulator is emulating.
    pub fn system() -> String {
        String::from("Game Boy")
    }
}
