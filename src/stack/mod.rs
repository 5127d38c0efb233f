//! Platform knowledge: native library mapping, Alpine commands, Python venv layout

pub mod alpine;
pub mod native;
pub mod python;

pub use native::{default_libraries, default_toolchain, NativeLibrary};
