//! Puts `memory.x` on the linker search path for bare-metal builds.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

const MEMORY_LAYOUT: &str = "memory.x";

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed={MEMORY_LAYOUT}");
    println!("cargo:rerun-if-changed=build.rs");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("none") {
        return Ok(());
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::other("OUT_DIR not set"))?;
    fs::copy(MEMORY_LAYOUT, out_dir.join(MEMORY_LAYOUT))?;

    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rustc-link-arg=-Tlink.x");
    println!("cargo:rustc-link-arg=-Tdefmt.x");
    Ok(())
}
