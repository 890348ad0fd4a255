fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();

    // Baked into config::CONF_FILE through option_env!.
    println!("cargo:rerun-if-env-changed=MEMPROXY_CONF_FILE");

    // The script names the direct exports; wrap-only builds export
    // everything they define.
    let direct = std::env::var_os("CARGO_FEATURE_DIRECT").is_some();

    match target_os.as_str() {
        "linux" | "freebsd" | "openbsd" if direct => {
            let script = format!("{}/linker/version_script.lds", manifest_dir);
            println!(
                "cargo:rustc-cdylib-link-arg=-Wl,--version-script={}",
                script
            );
            println!("cargo:rerun-if-changed=linker/version_script.lds");
        }
        _ => {}
    }

    // __real_* only exist in a binary linked with --wrap, so our own test
    // binaries are linked that way when the wrap surface is built.
    if std::env::var_os("CARGO_FEATURE_WRAP").is_some() && target_os == "linux" {
        for sym in [
            "malloc",
            "free",
            "calloc",
            "realloc",
            "memalign",
            "malloc_usable_size",
        ] {
            println!("cargo:rustc-link-arg-tests=-Wl,--wrap={}", sym);
        }
    }
}
