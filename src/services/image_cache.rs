use crate::error::{Error, Result};
use crate::models::question::IMAGE_DIR_NAME;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Content hash → relative image path, shared by every import the service runs.
#[derive(Clone, Default)]
pub struct ImageCache {
    entries: Arc<Mutex<HashMap<String, String>>>,
    // Readable without the map lock, which is held across file writes.
    count: Arc<AtomicUsize>,
}

/// Whether a lookup reused an existing file or produced a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Written,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &str) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|entries| entries.get(hash).cloned())
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
            self.count.store(0, Ordering::Relaxed);
        }
    }

    /// Returns the path cached for `hash`, or runs `write` and caches its
    /// result. The lock is held across `write` so one hash is written once.
    pub fn get_or_write<F>(&self, hash: &str, write: F) -> Result<(String, CacheOutcome)>
    where
        F: FnOnce() -> Result<String>,
    {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Processing("image cache lock poisoned".to_string()))?;

        if let Some(path) = entries.get(hash) {
            return Ok((path.clone(), CacheOutcome::Hit));
        }

        let path = write()?;
        entries.insert(hash.to_string(), path.clone());
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok((path, CacheOutcome::Written))
    }

    /// Hashes every decodable file already in `images_dir` so content written
    /// by an earlier process is reused. Returns the number of entries added.
    pub fn warm_from_dir(&self, images_dir: &Path) -> Result<usize> {
        if !images_dir.is_dir() {
            return Ok(0);
        }

        let mut added = 0;
        for entry in std::fs::read_dir(images_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let bytes = std::fs::read(entry.path())?;
            if image::guess_format(&bytes).is_err() && !is_vector_picture(&bytes) {
                tracing::debug!(file = ?entry.path(), "Skipping non-image file");
                continue;
            }
            let hash = content_hash(&bytes);
            let relative = format!("{}/{}", IMAGE_DIR_NAME, entry.file_name().to_string_lossy());
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| Error::Processing("image cache lock poisoned".to_string()))?;
            if !entries.contains_key(&hash) {
                entries.insert(hash, relative);
                self.count.fetch_add(1, Ordering::Relaxed);
                added += 1;
            }
        }

        Ok(added)
    }
}

/// SHA-256 (hex) of the image re-encoded as PNG, so identical pixels hash the
/// same whatever container they arrived in. Pictures that cannot be decoded
/// (EMF/WMF and the like) hash their raw bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    match canonical_png(bytes) {
        Ok(canonical) => digest(&canonical),
        Err(_) => digest(bytes),
    }
}

/// Placeable WMF key.
pub fn is_wmf(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xD7, 0xCD, 0xC6, 0x9A])
}

/// EMR_HEADER record carrying the " EMF" signature at offset 40.
pub fn is_emf(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0x01, 0x00, 0x00, 0x00]) && bytes.get(40..44) == Some(&b" EMF"[..])
}

/// Windows metafiles, which Office stores for pasted drawings.
pub fn is_vector_picture(bytes: &[u8]) -> bool {
    is_wmf(bytes) || is_emf(bytes)
}

/// Hex SHA-256 of already canonical PNG bytes.
pub fn digest(canonical: &[u8]) -> String {
    hex::encode(Sha256::digest(canonical))
}

/// Decodes any supported image and re-encodes it as PNG.
pub fn canonical_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, image::ImageFormat::Png)?;
    Ok(out.into_inner())
}
