//! UniFFI bindgen binary for generating Kotlin/Swift bindings
//!
//! Usage:
//!   cargo run -p mail-sync-ffi --features bindgen --bin uniffi-bindgen generate \
//!       --library target/aarch64-linux-android/release/libmail_sync_ffi.so \
//!       --language kotlin \
//!       --out-dir generated/kotlin

fn main() {
    uniffi::uniffi_bindgen_main()
}
