//! Build script for schism.
//!
//! Only the `schism` binary needs the bare-metal linker script: `cargo test`
//! builds the library against the host target and must not see any of this.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=link.ld");

    let target = env::var("TARGET").unwrap_or_default();
    if !target.starts_with("aarch64") {
        return;
    }

    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    println!(
        "cargo:rustc-link-arg-bin=schism=--script={manifest_dir}/link.ld"
    );
    println!("cargo:rustc-link-arg-bin=schism=-n");
}
