use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

/// Narrow interface to the binary object store: save bytes, get back a
/// retrievable location. Callers are expected to run `store` off the async
/// runtime (spawn_blocking) alongside their database work.
pub trait BlobStore: Send + Sync + 'static {
    fn store(&self, bytes: &[u8], content_type: &str) -> Result<String>;

    /// Remove a previously stored blob. Used by the orphan sweep; missing
    /// blobs are not an error.
    fn remove(&self, location: &str) -> Result<()>;
}

/// Local-disk blob store. Each blob lands as a single flat file at
/// `{dir}/{uuid}`; the returned location is the public `/media/{uuid}` path
/// served by the HTTP layer.
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl BlobStore for DiskStore {
    fn store(&self, bytes: &[u8], content_type: &str) -> Result<String> {
        let name = Uuid::new_v4().to_string();
        let path = self.path_for(&name);

        fs::write(&path, bytes)?;
        info!(
            "Stored blob {} ({} bytes, {})",
            name,
            bytes.len(),
            content_type
        );

        Ok(format!("/media/{}", name))
    }

    fn remove(&self, location: &str) -> Result<()> {
        // Locations are "/media/{uuid}"; anything else is not ours
        let Some(name) = location.strip_prefix("/media/") else {
            warn!("Refusing to remove foreign blob location {}", location);
            return Ok(());
        };
        // Parse as UUID to rule out path traversal
        let name: Uuid = match name.parse() {
            Ok(id) => id,
            Err(_) => {
                warn!("Refusing to remove non-UUID blob location {}", location);
                return Ok(());
            }
        };

        match fs::remove_file(self.path_for(&name.to_string())) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
