use aes_gcm_siv::{
    Aes256GcmSiv,
    aead::{KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};

/// Prints a fresh key for the `master-secret` entry of `app-config.toml`.
/// The key encrypts onboarding medical histories at rest, so rotating it
/// makes existing onboarding records unreadable.
fn main() {
    let key = Aes256GcmSiv::generate_key(&mut OsRng);
    let encoded_key = STANDARD_NO_PAD.encode(key.as_slice());
    eprintln!("AES-256 GCM SIV key (base64, no padding) for app-config.toml:");
    println!("master-secret = \"{encoded_key}\"");
}
