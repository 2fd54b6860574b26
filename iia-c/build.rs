use std::env;
use std::path::PathBuf;

fn main() {
    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap();

    println!("cargo:rustc-check-cfg=cfg(sd_native)");
    println!("cargo:rerun-if-env-changed=SD_LIB_DIR");
    println!("cargo:rerun-if-env-changed=ANDROID_NDK_ROOT");

    // Android always links the real engine; desktop only on request.
    let link_native = target_os == "android" || env::var_os("CARGO_FEATURE_NATIVE").is_some();
    if !link_native {
        println!("cargo:rerun-if-changed=build.rs");
        return;
    }

    println!("cargo:rustc-cfg=sd_native");

    let crate_dir = env::var("CARGO_MANIFEST_DIR").unwrap();

    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_pragma_once(true)
        .with_include_guard("IIA_C_H")
        .with_documentation(true)
        .generate()
        .expect("Unable to generate bindings")
        .write_to_file("iia_c.h");

    // Prebuilt stable-diffusion.cpp static libraries. Defaults to
    // <workspace>/target/sd-<os>.
    let sd_lib_dir = match env::var("SD_LIB_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(_) => {
            let manifest_path = PathBuf::from(&crate_dir);
            let workspace_root = manifest_path.parent().unwrap();
            workspace_root.join("target").join(format!("sd-{}", target_os))
        }
    };

    let sd_lib_path = sd_lib_dir.join("libstable-diffusion.a");
    if !sd_lib_path.exists() {
        println!(
            "cargo:warning=libstable-diffusion.a not found at: {}",
            sd_lib_path.display()
        );
        println!("cargo:warning=Set SD_LIB_DIR to the directory holding the static libraries");
        panic!("stable-diffusion.cpp static library not found");
    }

    println!("cargo:rustc-link-search=native={}", sd_lib_dir.display());

    if target_os == "android" {
        let ndk_root = env::var("ANDROID_NDK_ROOT").unwrap_or_default();
        if !ndk_root.is_empty() {
            let sysroot = format!("{}/toolchains/llvm/prebuilt/linux-x86_64/sysroot", ndk_root);
            println!(
                "cargo:rustc-link-search=native={}/usr/lib/aarch64-linux-android",
                sysroot
            );
        }

        println!("cargo:rustc-link-lib=log");
        println!("cargo:rustc-link-lib=dl");
        println!("cargo:rustc-link-lib=m");
    }

    // stable-diffusion and ggml reference each other
    println!("cargo:rustc-link-arg=-Wl,--start-group");
    println!("cargo:rustc-link-arg={}", sd_lib_path.display());
    for lib in ["libggml.a", "libggml-base.a", "libggml-cpu.a"] {
        let path = sd_lib_dir.join(lib);
        if path.exists() {
            println!("cargo:rustc-link-arg={}", path.display());
        }
    }
    println!("cargo:rustc-link-arg=-Wl,--end-group");

    match target_os.as_str() {
        "android" => println!("cargo:rustc-link-lib=c++_shared"),
        "macos" | "ios" => println!("cargo:rustc-link-lib=c++"),
        _ => println!("cargo:rustc-link-lib=stdc++"),
    }

    println!(
        "cargo:warning=Linked stable-diffusion.cpp from: {}",
        sd_lib_dir.display()
    );

    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=build.rs");
}
