//! Firmware chain-of-trust: deterministic image content, SHA-256 verification,
//! and tamper/restore demo operations.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use bmc_error::{BmcError, Result};

use crate::constants::secure_boot as sb_consts;
use crate::sel::{EventLog, Severity};

/// A simulated firmware image: deterministic content plus its recorded hash.
///
/// Invariant: `verified == true` implies `actual_hash` is populated; `passed`
/// is only meaningful once `verified` is true.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwImage {
    pub name: String,
    pub path: PathBuf,
    pub expected_hash: String,
    pub actual_hash: Option<String>,
    pub verified: bool,
    pub passed: bool,
}

/// Minimal linear congruential generator used to derive deterministic image
/// content from a seed. What matters is that the same seed always
/// regenerates the same bytes, not parity with any particular PRNG algorithm.
struct DeterministicByteStream {
    state: u64,
}

impl DeterministicByteStream {
    fn new(seed: u64) -> Self {
        Self { state: seed.wrapping_mul(6364136223846793005).wrapping_add(1) }
    }

    fn next_byte(&mut self) -> u8 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.state >> 33) as u8
    }
}

fn generate_image_bytes(seed: u64) -> Vec<u8> {
    let mut stream = DeterministicByteStream::new(seed);
    (0..sb_consts::FW_IMAGE_SIZE).map(|_| stream.next_byte()).collect()
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Write all firmware images (freshly generated, untampered) under `dir`,
/// returning the chain-of-trust table in verification order.
pub fn init_images(dir: &Path) -> Result<Vec<FwImage>> {
    std::fs::create_dir_all(dir).map_err(|e| BmcError::FileWrite {
        path: dir.to_path_buf(),
        source: e,
    })?;

    sb_consts::FW_IMAGE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let seed = sb_consts::FW_SEED_BASE + i as u64;
            let bytes = generate_image_bytes(seed);
            let path = dir.join(format!("{name}.bin"));
            std::fs::write(&path, &bytes).map_err(|e| BmcError::FileWrite {
                path: path.clone(),
                source: e,
            })?;
            Ok(FwImage {
                name: name.to_string(),
                path,
                expected_hash: hash_bytes(&bytes),
                actual_hash: None,
                verified: false,
                passed: false,
            })
        })
        .collect()
}

/// Walk the chain in order, verifying each image's hash against its recorded
/// expected hash. Stops at the first failure (unreadable file or hash
/// mismatch): images past the break point are left `verified = false`, per
/// the chain-of-trust contract. Returns the overall pass/fail result.
pub fn verify_chain(images: &mut [FwImage], sel: &mut EventLog, now: u64) -> bool {
    let mut overall_passed = true;

    for image in images.iter_mut() {
        let bytes = match std::fs::read(&image.path) {
            Ok(b) => b,
            Err(e) => {
                image.verified = true;
                image.passed = false;
                sel.add(
                    Severity::Critical,
                    "SecureBoot",
                    format!("Cannot read image {}: {}", image.name, e),
                    now,
                );
                overall_passed = false;
                break;
            }
        };

        let actual = hash_bytes(&bytes);
        image.actual_hash = Some(actual.clone());
        image.verified = true;
        image.passed = actual == image.expected_hash;

        if image.passed {
            sel.add(
                Severity::Info,
                "SecureBoot",
                format!("image '{}' verified OK", image.name),
                now,
            );
        } else {
            sel.add(
                Severity::Critical,
                "SecureBoot",
                format!("hash mismatch for image '{}', chain of trust broken", image.name),
                now,
            );
            overall_passed = false;
            break;
        }
    }

    if overall_passed {
        sel.add(Severity::Info, "SecureBoot", "Secure boot verification passed", now);
    }

    overall_passed
}

/// Demo-only: corrupt the first byte of `image`, breaking the chain at that
/// point on the next verify.
pub fn inject_tamper(image: &FwImage, sel: &mut EventLog, now: u64) -> Result<()> {
    let mut bytes = std::fs::read(&image.path).map_err(|e| BmcError::TransientIo {
        path: image.path.clone(),
        source: e,
    })?;
    if let Some(first) = bytes.first_mut() {
        *first = 0xFF;
    }
    std::fs::write(&image.path, &bytes).map_err(|e| BmcError::FileWrite {
        path: image.path.clone(),
        source: e,
    })?;

    sel.add(
        Severity::Warning,
        "SecureBoot",
        format!("[DEMO] injected tamper into image '{}'", image.name),
        now,
    );
    Ok(())
}

/// Demo-only: regenerate `image` from its deterministic seed, undoing any tamper.
pub fn restore(image: &FwImage, seed: u64, sel: &mut EventLog, now: u64) -> Result<()> {
    let bytes = generate_image_bytes(seed);
    std::fs::write(&image.path, &bytes).map_err(|e| BmcError::FileWrite {
        path: image.path.clone(),
        source: e,
    })?;

    sel.add(
        Severity::Info,
        "SecureBoot",
        format!("[DEMO] restored image '{}' from seed", image.name),
        now,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_generates_identical_content() {
        let a = generate_image_bytes(42);
        let b = generate_image_bytes(42);
        assert_eq!(a, b);
        assert_eq!(a.len(), sb_consts::FW_IMAGE_SIZE);
    }

    #[test]
    fn different_seeds_generate_different_content() {
        let a = generate_image_bytes(42);
        let b = generate_image_bytes(43);
        assert_ne!(a, b);
    }

    #[test]
    fn init_and_verify_a_fresh_chain_passes() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = init_images(dir.path()).unwrap();
        let mut sel = EventLog::new();
        assert!(verify_chain(&mut images, &mut sel, 0));
        assert!(sel.all().iter().any(|e| e.severity == Severity::Info));
        assert!(images.iter().all(|img| img.verified && img.passed));
    }

    #[test]
    fn tampering_breaks_the_chain_and_restore_fixes_it() {
        let dir = tempfile::tempdir().unwrap();
        let mut images = init_images(dir.path()).unwrap();
        let mut sel = EventLog::new();

        inject_tamper(&images[1], &mut sel, 1).unwrap();
        assert!(!verify_chain(&mut images, &mut sel, 2));

        assert!(images[0].verified && images[0].passed);
        assert!(images[1].verified && !images[1].passed);
        assert!(!images[2].verified);
        assert!(!images[3].verified);
        assert!(sel
            .all()
            .iter()
            .any(|e| e.severity == Severity::Critical && e.message.contains("bmc_firmware")));

        let seed = sb_consts::FW_SEED_BASE + 1;
        restore(&images[1], seed, &mut sel, 3).unwrap();
        assert!(verify_chain(&mut images, &mut sel, 4));
        assert!(images.iter().all(|img| img.verified && img.passed));
    }
}
