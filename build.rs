use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();

    if target.starts_with("aarch64") {
        println!("cargo:rustc-link-arg=-Tlink.ld");
    }

    println!("cargo:rerun-if-changed=link.ld");
}
