use std::env;
use std::path::PathBuf;

const HEADER: &str = "mss.h";

fn main() {
    println!("cargo:rerun-if-changed=cbindgen.toml");
    println!("cargo:rerun-if-changed=src");

    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let config = cbindgen::Config::from_file(crate_dir.join("cbindgen.toml"))
        .expect("cbindgen.toml must be readable");

    let include = crate_dir.join("include");
    std::fs::create_dir_all(&include).expect("cannot create include/");

    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
        .expect("header generation failed")
        .write_to_file(include.join(HEADER));
}
