//! Content hashing (blake3, 256-bit) in bounded chunks
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const HASH_PREFIX: &str = "blake3:";

/// Read size for streaming hashes
pub const CHUNK_SIZE: usize = 64 * 1024;

pub fn hash_bytes(data: &[u8]) -> String {
    format!("{}{}", HASH_PREFIX, blake3::hash(data))
}

/// Hash a file's content without loading it whole; returns digest and byte count
pub fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let file = File::open(path)?;
    hash_reader(file)
}

pub fn hash_reader<R: Read>(reader: R) -> io::Result<(String, u64)> {
    let mut reader = HashingReader::new(reader);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        if reader.read(&mut buf)? == 0 {
            break;
        }
    }
    let (_, digest, count) = reader.into_parts();
    Ok((digest, count))
}

/// Pass-through reader that hashes and counts everything read through it
pub struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
    count: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            count: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.count
    }

    /// Inner reader, `blake3:<hex>` of the bytes seen, and their count
    pub fn into_parts(self) -> (R, String, u64) {
        let digest = format!("{}{}", HASH_PREFIX, self.hasher.finalize());
        (self.inner, digest, self.count)
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let (digest, count) = hash_reader(&data[..]).unwrap();
        assert_eq!(digest, hash_bytes(&data));
        assert_eq!(count, data.len() as u64);
    }

    #[test]
    fn test_hash_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello archive").unwrap();
        let (digest, count) = hash_file(file.path()).unwrap();
        assert_eq!(digest, hash_bytes(b"hello archive"));
        assert_eq!(count, 13);
        assert!(digest.starts_with(HASH_PREFIX));
    }

    #[test]
    fn test_hash_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(hash_file(&dir.path().join("nope")).is_err());
    }
}
