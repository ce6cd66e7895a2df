// Build script that tries to generate a C header with `cbindgen`.
// If `cbindgen` is not available, it falls back to copying the
// checked-in `include/lpmorph.h` to $OUT_DIR.
//
// Either way, consumers can include the header from:
//   - <repo>/lpmorph-ffi/include/lpmorph.h   (checked-in)
//   - $OUT_DIR/lpmorph.h

use std::{env, fs, path::PathBuf, process::Command};

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=include/lpmorph.h");

    let (Ok(crate_dir), Ok(out_dir)) = (env::var("CARGO_MANIFEST_DIR"), env::var("OUT_DIR")) else {
        println!("cargo:warning=lpmorph-ffi: cargo did not set the build directories; skipping header");
        return;
    };
    let crate_dir = PathBuf::from(crate_dir);
    let header_path_repo = crate_dir.join("include").join("lpmorph.h");
    let header_path_out = PathBuf::from(out_dir).join("lpmorph.h");

    let cbindgen_ok = Command::new("cbindgen")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if cbindgen_ok {
        let status = Command::new("cbindgen")
            .arg("--crate")
            .arg("lpmorph-ffi")
            .arg("--lang")
            .arg("C")
            .arg("--output")
            .arg(&header_path_out)
            .current_dir(&crate_dir)
            .status();

        match status {
            Ok(s) if s.success() => {
                println!("cargo:warning=lpmorph-ffi: generated header with cbindgen -> {}", header_path_out.display());
                return;
            }
            _ => println!("cargo:warning=lpmorph-ffi: cbindgen failed; falling back to checked-in header"),
        }
    }

    if let Err(e) = fs::copy(&header_path_repo, &header_path_out) {
        println!("cargo:warning=lpmorph-ffi: could not copy include/lpmorph.h to OUT_DIR: {e}");
    }
}
