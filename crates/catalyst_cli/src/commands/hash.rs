//! Hash command implementation.

use catalyst_protocol::{hashing, ContentHash};
use std::path::Path;

/// Computes the content address of the file at `path`.
pub fn hash_file(path: &Path) -> std::io::Result<ContentHash> {
    let bytes = std::fs::read(path)?;
    Ok(hashing::ipfs_hash(&bytes))
}

/// Runs the hash command.
pub fn run<P: AsRef<Path>>(files: &[P]) -> Result<(), Box<dyn std::error::Error>> {
    for path in files {
        let path = path.as_ref();
        let hash = hash_file(path).map_err(|e| format!("Cannot read {}: {e}", path.display()))?;
        println!("{hash}  {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_match_the_protocol() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.js");
        std::fs::write(&path, b"export {}").unwrap();

        let hash = hash_file(&path).unwrap();
        assert_eq!(hash, hashing::ipfs_hash(b"export {}"));
        assert!(hashing::is_valid_ipfs_hash(&hash));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run(&[dir.path().join("missing")]).is_err());
    }
}
