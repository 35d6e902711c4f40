//! Durable model artifacts.
//!
//! A trained model is persisted as a small binary container: magic bytes,
//! format version, payload length, blake3 payload hash, flags, then a
//! bincode-encoded payload (metadata + opaque model bytes). The hash is
//! verified on read so a corrupted artifact fails loudly instead of
//! deserializing garbage.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAGIC: &[u8; 4] = b"FFMD";
const VERSION: u32 = 1;
const HEADER_SIZE: usize = 4 + 4 + 8 + 32 + 4;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] Box<bincode::ErrorKind>),
    #[error("Invalid artifact header")]
    InvalidHeader,
    #[error("Artifact version mismatch: {0}")]
    VersionMismatch(u32),
    #[error("Artifact hash mismatch")]
    HashMismatch,
    #[error("Unknown artifact reference '{0}'")]
    UnknownReference(String),
}

pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Descriptive metadata stored alongside the model bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub algorithm: String,
    pub problem_type: Option<String>,
    pub created_at: u64,
    pub engine_version: String,
}

impl ArtifactMetadata {
    pub fn new(
        algorithm: impl Into<String>,
        problem_type: Option<String>,
        engine_version: impl Into<String>,
    ) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            algorithm: algorithm.into(),
            problem_type,
            created_at,
            engine_version: engine_version.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactPayload {
    metadata: ArtifactMetadata,
    model: Vec<u8>,
}

/// A serialized trained model plus its metadata.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    metadata: ArtifactMetadata,
    model: Vec<u8>,
    flags: u32,
}

impl ModelArtifact {
    pub fn new(metadata: ArtifactMetadata, model: Vec<u8>) -> Self {
        Self {
            metadata,
            model,
            flags: 0,
        }
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// The opaque model bytes.
    pub fn model_bytes(&self) -> &[u8] {
        &self.model
    }

    fn payload(&self) -> Result<Vec<u8>, Box<bincode::ErrorKind>> {
        bincode::serialize(&ArtifactPayload {
            metadata: self.metadata.clone(),
            model: self.model.clone(),
        })
    }

    /// Blake3 hash of the encoded payload.
    pub fn payload_hash(&self) -> ArtifactResult<[u8; 32]> {
        let payload = self.payload()?;
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(hasher.finalize().as_bytes());
        Ok(bytes)
    }

    pub fn to_bytes(&self) -> ArtifactResult<Vec<u8>> {
        let payload = self.payload()?;
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let digest = hasher.finalize();

        let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(digest.as_bytes());
        bytes.extend_from_slice(&self.flags.to_le_bytes());
        bytes.extend_from_slice(&payload);
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> ArtifactResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(ArtifactError::InvalidHeader);
        }
        if &bytes[..4] != MAGIC {
            return Err(ArtifactError::InvalidHeader);
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("4-byte slice"));
        if version != VERSION {
            return Err(ArtifactError::VersionMismatch(version));
        }

        let payload_len = u64::from_le_bytes(bytes[8..16].try_into().expect("8-byte slice")) as usize;
        let hash = &bytes[16..48];
        let flags = u32::from_le_bytes(bytes[48..52].try_into().expect("4-byte slice"));

        if bytes.len() < HEADER_SIZE + payload_len {
            return Err(ArtifactError::InvalidHeader);
        }

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + payload_len];
        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize().as_bytes() != hash {
            return Err(ArtifactError::HashMismatch);
        }

        let ArtifactPayload { metadata, model } = bincode::deserialize(payload)?;
        Ok(Self {
            metadata,
            model,
            flags,
        })
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> ArtifactResult<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> ArtifactResult<Self> {
        let mut file = std::fs::File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }
}

/// Durable storage of model artifacts, addressed by an opaque reference.
pub trait ArtifactStore: Send + Sync {
    /// Persists an artifact and returns its reference.
    fn save(&self, artifact: &ModelArtifact) -> ArtifactResult<String>;

    /// Loads an artifact by reference.
    fn load(&self, reference: &str) -> ArtifactResult<ModelArtifact>;
}

/// Filesystem-backed artifact store. References are content-addressed file
/// names under the store root, so saving the same artifact twice is
/// idempotent.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> ArtifactResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactStore for FsArtifactStore {
    fn save(&self, artifact: &ModelArtifact) -> ArtifactResult<String> {
        let hash = artifact.payload_hash()?;
        let reference = format!("{}.ffm", hex(&hash[..16]));
        artifact.write_to_path(self.root.join(&reference))?;
        Ok(reference)
    }

    fn load(&self, reference: &str) -> ArtifactResult<ModelArtifact> {
        let path = self.root.join(reference);
        if !path.is_file() {
            return Err(ArtifactError::UnknownReference(reference.to_string()));
        }
        ModelArtifact::read_from_path(path)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
