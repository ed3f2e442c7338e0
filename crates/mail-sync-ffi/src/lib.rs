//! UniFFI bindings crate for the mail-sync library
//!
//! This crate wraps the mail-sync crate for UniFFI library mode binding
//! generation. The Android and iOS apps link against it and drive the
//! event sync from their own background schedulers.
//!
//! ## Building for Android
//!
//! 1. Build the library for the device targets:
//!    ```bash
//!    cargo ndk -t arm64-v8a -t x86_64 build --release -p mail-sync-ffi
//!    ```
//!
//! 2. Generate Kotlin bindings:
//!    ```bash
//!    cargo run -p mail-sync-ffi --features bindgen --bin uniffi-bindgen generate \
//!        --library target/aarch64-linux-android/release/libmail_sync_ffi.so \
//!        --language kotlin \
//!        --out-dir generated/kotlin
//!    ```

// Re-export everything from the mail-sync crate's FFI module
pub use mail_sync::ffi::*;

// Library mode needs the scaffolding symbols in this cdylib
mail_sync::uniffi_reexport_scaffolding!();
