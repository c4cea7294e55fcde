use std::sync::Arc;

use uuid::Uuid;

use parlor_blob::BlobStore;
use parlor_db::models::NewAttachmentRow;

use crate::error::{CoreError, Result};

/// 10 MiB upload limit for file attachments
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

pub const ALLOWED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "gif", "pdf", "docx", "txt"];

pub const ALLOWED_CONTENT_TYPES: [&str; 6] = [
    "image/jpeg",
    "image/png",
    "image/gif",
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
];

/// An uploaded attachment as received from the transport layer.
#[derive(Debug)]
pub enum AttachmentUpload {
    File {
        bytes: Vec<u8>,
        declared_name: String,
        content_type: String,
    },
    Audio {
        bytes: Vec<u8>,
        content_type: String,
    },
}

/// A validated attachment whose bytes are already in the blob store.
/// The row is inserted inside the message transaction; until that commits,
/// `location` is the only handle on the stored blob.
pub struct StagedAttachment {
    pub row: NewAttachmentRow,
    pub location: String,
}

/// Validates uploads and stages their bytes in the blob store.
///
/// Validation runs strictly before any blob write, so a rejected upload
/// never leaves anything to clean up.
#[derive(Clone)]
pub struct AttachmentLinker {
    store: Arc<dyn BlobStore>,
}

impl AttachmentLinker {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn link(&self, upload: AttachmentUpload) -> Result<StagedAttachment> {
        match upload {
            AttachmentUpload::File {
                bytes,
                declared_name,
                content_type,
            } => self.link_file(&bytes, &declared_name, &content_type),
            AttachmentUpload::Audio {
                bytes,
                content_type,
            } => self.link_audio(&bytes, &content_type),
        }
    }

    pub fn link_file(
        &self,
        bytes: &[u8],
        declared_name: &str,
        content_type: &str,
    ) -> Result<StagedAttachment> {
        let extension = extension_of(declared_name);
        validate_file(bytes.len() as u64, &extension, content_type)?;

        let location = self.store.store(bytes, content_type)?;

        Ok(StagedAttachment {
            row: NewAttachmentRow::File {
                id: Uuid::new_v4().to_string(),
                location: location.clone(),
                size_bytes: bytes.len() as i64,
                content_type: content_type.to_string(),
                display_name: declared_name.to_string(),
                extension,
            },
            location,
        })
    }

    /// Audio clips carry no size or type validation; only file uploads go
    /// through the whitelist.
    pub fn link_audio(&self, bytes: &[u8], content_type: &str) -> Result<StagedAttachment> {
        let location = self.store.store(bytes, content_type)?;

        Ok(StagedAttachment {
            row: NewAttachmentRow::Audio {
                id: Uuid::new_v4().to_string(),
                location: location.clone(),
                size_bytes: bytes.len() as i64,
                content_type: content_type.to_string(),
            },
            location,
        })
    }

    /// Best-effort removal of a staged blob whose message transaction
    /// failed. Only called when a blob write actually happened.
    pub fn discard(&self, staged: &StagedAttachment) -> Result<()> {
        Ok(self.store.remove(&staged.location)?)
    }
}

fn validate_file(size: u64, extension: &str, content_type: &str) -> Result<()> {
    if size > MAX_FILE_SIZE {
        return Err(CoreError::validation("File must not be larger than 10 MB."));
    }

    if !ALLOWED_EXTENSIONS.contains(&extension) {
        return Err(CoreError::validation("Invalid file extension."));
    }

    if !ALLOWED_CONTENT_TYPES.contains(&content_type) {
        return Err(CoreError::validation("Invalid file content type."));
    }

    Ok(())
}

/// Lowercased extension after the last dot; empty when there is none,
/// which fails the whitelist.
fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Blob store double that counts writes without touching disk.
    #[derive(Default)]
    pub(crate) struct CountingStore {
        pub writes: AtomicUsize,
        pub removed: Mutex<Vec<String>>,
    }

    impl BlobStore for CountingStore {
        fn store(&self, _bytes: &[u8], _content_type: &str) -> anyhow::Result<String> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(format!("/media/{}", Uuid::new_v4()))
        }

        fn remove(&self, location: &str) -> anyhow::Result<()> {
            self.removed.lock().unwrap().push(location.to_string());
            Ok(())
        }
    }

    fn linker() -> (AttachmentLinker, Arc<CountingStore>) {
        let store = Arc::new(CountingStore::default());
        (AttachmentLinker::new(store.clone()), store)
    }

    fn assert_validation(result: Result<StagedAttachment>, fragment: &str) {
        match result {
            Err(CoreError::Validation(msg)) => assert!(
                msg.contains(fragment),
                "expected {:?} in {:?}",
                fragment,
                msg
            ),
            other => panic!("expected validation error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn oversized_file_rejected_before_any_blob_write() {
        let (linker, store) = linker();
        let bytes = vec![0u8; (MAX_FILE_SIZE + 1) as usize];

        let result = linker.link_file(&bytes, "big.png", "image/png");

        assert_validation(result, "10 MB");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disallowed_extension_rejected_before_any_blob_write() {
        let (linker, store) = linker();

        let result = linker.link_file(b"MZ", "setup.exe", "image/png");

        assert_validation(result, "extension");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disallowed_content_type_rejected_before_any_blob_write() {
        let (linker, store) = linker();

        let result = linker.link_file(b"fake", "cat.png", "application/x-msdownload");

        assert_validation(result, "content type");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn missing_extension_fails_the_whitelist() {
        let (linker, store) = linker();

        let result = linker.link_file(b"data", "README", "text/plain");

        assert_validation(result, "extension");
        assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn valid_file_is_stored_and_staged() {
        let (linker, store) = linker();

        let staged = linker.link_file(b"pixels", "photo.JPG", "image/jpeg").unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        assert!(staged.location.starts_with("/media/"));
        match staged.row {
            NewAttachmentRow::File {
                ref extension,
                ref display_name,
                size_bytes,
                ..
            } => {
                assert_eq!(extension, "jpg");
                assert_eq!(display_name, "photo.JPG");
                assert_eq!(size_bytes, 6);
            }
            _ => panic!("expected file row"),
        }
    }

    #[test]
    fn audio_is_stored_without_validation() {
        let (linker, store) = linker();
        let bytes = vec![0u8; (MAX_FILE_SIZE + 1) as usize];

        let staged = linker.link_audio(&bytes, "audio/webm").unwrap();

        assert_eq!(store.writes.load(Ordering::SeqCst), 1);
        match staged.row {
            NewAttachmentRow::Audio { size_bytes, .. } => {
                assert_eq!(size_bytes, (MAX_FILE_SIZE + 1) as i64);
            }
            _ => panic!("expected audio row"),
        }
    }

    #[test]
    fn discard_removes_the_staged_blob() {
        let (linker, store) = linker();

        let staged = linker.link_audio(b"clip", "audio/webm").unwrap();
        linker.discard(&staged).unwrap();

        assert_eq!(*store.removed.lock().unwrap(), vec![staged.location.clone()]);
    }
}
