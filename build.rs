fn main() {
    // Only link the concentrator HAL when building for real hardware.
    // Cargo exposes enabled features to build scripts as CARGO_FEATURE_* env vars.
    if std::env::var("CARGO_FEATURE_SX1302").is_err() {
        return;
    }

    println!("cargo:rerun-if-env-changed=LORAGW_LIB_DIR");
    if let Ok(dir) = std::env::var("LORAGW_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir);
    }

    // setUpGateway() lives in the board shim, the rest in libloragw itself
    println!("cargo:rustc-link-lib=static=gateway");
    println!("cargo:rustc-link-lib=static=loragw");
    println!("cargo:rustc-link-lib=static=tinymt32");
    println!("cargo:rustc-link-lib=static=parson");
    println!("cargo:rustc-link-lib=static=base64");
    println!("cargo:rustc-link-lib=dylib=m");
}
