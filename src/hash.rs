use digest::Digest;
use sha1::Sha1;
use sha2::Sha256;
use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::{Path, PathBuf},
};

use crate::error::FetchError;

/// An expected content digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashDigest {
    Sha1(String),
    Sha256(String),
}

impl HashDigest {
    pub fn sha1(hex: &str) -> Self {
        HashDigest::Sha1(hex.trim().to_ascii_lowercase())
    }

    pub fn sha256(hex: &str) -> Self {
        HashDigest::Sha256(hex.trim().to_ascii_lowercase())
    }

    pub fn expected(&self) -> &str {
        match self {
            HashDigest::Sha1(s) | HashDigest::Sha256(s) => s,
        }
    }

    fn hash_reader<D: Digest + Default>(mut reader: impl Read) -> io::Result<D> {
        let mut hasher = D::default();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hasher)
    }

    /// Hashes `reader` with the same algorithm as `self` and returns the hex digest.
    pub fn digest_reader(&self, reader: impl Read) -> io::Result<String> {
        match self {
            HashDigest::Sha1(_) => {
                let hasher = Self::hash_reader::<Sha1>(reader)?;
                Ok(format!("{:x}", hasher.finalize()))
            }
            HashDigest::Sha256(_) => {
                let hasher = Self::hash_reader::<Sha256>(reader)?;
                Ok(format!("{:x}", hasher.finalize()))
            }
        }
    }

    /// Hashes the file at `path` on the blocking pool.
    ///
    /// Returns `Ok(None)` on a match and `Ok(Some(actual))` on a mismatch.
    pub async fn check_file<P: AsRef<Path>>(&self, path: P) -> Result<Option<String>, FetchError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        let digest = self.clone();
        let actual = tokio::task::spawn_blocking(move || {
            let file = File::open(&path)?;
            digest.digest_reader(BufReader::new(file))
        })
        .await??;

        if actual == self.expected() {
            Ok(None)
        } else {
            Ok(Some(actual))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HELLO_SHA1: &str = "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d";
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn test_digest_reader() {
        let sha1 = HashDigest::sha1(HELLO_SHA1);
        assert_eq!(sha1.digest_reader(&b"hello"[..]).unwrap(), HELLO_SHA1);
        let sha256 = HashDigest::sha256(HELLO_SHA256);
        assert_eq!(sha256.digest_reader(&b"hello"[..]).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_expected_is_normalized() {
        let digest = HashDigest::sha1(&format!("  {}  ", HELLO_SHA1.to_ascii_uppercase()));
        assert_eq!(digest.expected(), HELLO_SHA1);
    }

    #[tokio::test]
    async fn test_check_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let good = HashDigest::sha256(HELLO_SHA256);
        assert_eq!(good.check_file(&path).await.unwrap(), None);

        let bad = HashDigest::sha256(&"0".repeat(64));
        assert_eq!(
            bad.check_file(&path).await.unwrap(),
            Some(HELLO_SHA256.to_string())
        );
    }

    #[tokio::test]
    async fn test_check_missing_file_errors() {
        let dir = tempdir().unwrap();
        let digest = HashDigest::sha1(HELLO_SHA1);
        assert!(digest.check_file(dir.path().join("nope")).await.is_err());
    }
}
