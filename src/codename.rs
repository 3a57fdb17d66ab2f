//! Generated implant names.
//!
//! Names double as workspace directory names and as part of the compiled
//! tree's import path, so the alphabet is restricted to `[A-Za-z0-9_-]`.
//! Two name-less requests must get distinct names with overwhelming
//! probability: the wordlist pair alone is far too small a namespace, so a
//! numeric discriminator widens it to ~5.8e7 combinations.

use rand::seq::SliceRandom;
use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "CRIMSON", "HOLLOW", "SILENT", "RUSTIC", "FROZEN", "GILDED", "LUNAR", "FERAL",
    "OBLIQUE", "PALLID", "SABLE", "TORRID", "UMBRAL", "VIVID", "WANING", "ZEALOUS",
    "ARID", "BRAZEN", "COVERT", "DORMANT", "EXILED", "GRAVEN", "IRATE", "JAGGED",
];

const NOUNS: &[&str] = &[
    "SPIDER", "HARBOR", "MONARCH", "CIPHER", "TALON", "EMBER", "GLACIER", "HYDRA",
    "JACKAL", "KESTREL", "LANTERN", "MERIDIAN", "NOMAD", "OSPREY", "PYLON", "QUARRY",
    "RAVINE", "SEXTANT", "THICKET", "VORTEX", "WARDEN", "ZENITH", "BASILISK", "CORSAIR",
];

/// Generate an `ADJECTIVE_NOUN_NNNNN` codename for a request that supplied
/// no name. A codename collision would reuse another build's (os, arch,
/// name) workspace, so the discriminator is not optional decoration.
pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).unwrap_or(&ADJECTIVES[0]);
    let noun = NOUNS.choose(&mut rng).unwrap_or(&NOUNS[0]);
    let discriminator: u32 = rng.gen_range(0..100_000);
    format!("{adjective}_{noun}_{discriminator:05}")
}

/// Reduce a caller-supplied name to the filesystem- and import-path-safe
/// alphabet. Empty input is the caller's problem; resolution generates a
/// codename instead of sanitizing in that case.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
