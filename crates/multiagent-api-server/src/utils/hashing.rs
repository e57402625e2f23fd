use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of an uploaded file, used to detect re-uploads of the same document.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
