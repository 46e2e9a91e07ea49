use std::{env, fs, path::Path};

/// Embeds the `[workspace.package]` version as `VERSION`.
fn main() {
    let manifest = fs::read_to_string("../Cargo.toml").expect("Unable to read workspace Cargo.toml");
    let version = manifest
        .lines()
        .skip_while(|line| line.trim() != "[workspace.package]")
        .take_while(|line| !line.starts_with("[workspace.dependencies]"))
        .find_map(|line| line.strip_prefix("version = "))
        .map(|v| v.trim_matches(&[' ', '"']).to_string())
        .expect("Unable to find workspace version");

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let version_file = Path::new(&out_dir).join("version.rs");
    fs::write(&version_file, format!("pub const VERSION: &str = \"{version}\";"))
        .expect("Unable to write version file");

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../Cargo.toml");
}
