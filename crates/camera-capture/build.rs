//! Build script for the camera adapter
//!
//! Links the vendor ASI camera library when the `asi-sdk` feature is enabled.

fn main() {
    println!("cargo:rerun-if-env-changed=ASI_SDK_LIB_DIR");

    if std::env::var_os("CARGO_FEATURE_ASI_SDK").is_none() {
        return;
    }

    if let Some(dir) = std::env::var_os("ASI_SDK_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
    }

    println!("cargo:rustc-link-lib=dylib=ASICamera2");

    // The SDK pulls in libusb and pthreads on Linux
    #[cfg(target_os = "linux")]
    {
        println!("cargo:rustc-link-lib=usb-1.0");
        println!("cargo:rustc-link-lib=pthread");
    }
}
