//! Checksummed binary framing for index files.
//!
//! Every segment and deletion file is written as:
//!
//! ```text
//! magic: u32 | version: u32 | payload_len: u64 | payload | crc32: u32
//! ```
//!
//! All integers are little-endian and the trailing CRC covers every byte
//! before it.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::storage::traits::{StorageError, StorageInput, StorageOutput};

/// A checksumming writer over a storage output.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    hasher: crc32fast::Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write raw bytes with a u64 length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_u64(value.len() as u64)?;
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Get current position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append the checksum, then flush, sync and close the output.
    pub fn close(mut self) -> Result<()> {
        let checksum = self.hasher.finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.close()?;
        Ok(())
    }
}

/// A checksum-verifying reader over a storage input.
pub struct StructReader<R: StorageInput> {
    reader: R,
    hasher: crc32fast::Hasher,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            hasher: crc32fast::Hasher::new(),
            position: 0,
            file_size,
        })
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 4;
        Ok(value)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.hasher.update(&value.to_le_bytes());
        self.position += 8;
        Ok(value)
    }

    /// Read length-prefixed bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_u64()?;
        // Trailing checksum takes the last four bytes
        let remaining = self.file_size.saturating_sub(self.position + 4);
        if length > remaining {
            return Err(StorageError::Corrupted(format!(
                "length {length} exceeds remaining {remaining} bytes"
            ))
            .into());
        }

        let mut bytes = vec![0u8; length as usize];
        self.reader.read_exact(&mut bytes)?;
        self.hasher.update(&bytes);
        self.position += length;
        Ok(bytes)
    }

    /// Read the trailing checksum and compare it to the bytes read so far.
    pub fn verify_checksum(mut self) -> Result<()> {
        let stored = self.reader.read_u32::<LittleEndian>()?;
        let computed = self.hasher.finalize();
        if stored != computed {
            return Err(StorageError::Corrupted(format!(
                "checksum mismatch (stored {stored:08x}, computed {computed:08x})"
            ))
            .into());
        }
        Ok(())
    }
}

/// Write a framed payload to an output.
pub fn write_framed<W: StorageOutput>(
    output: W,
    magic: u32,
    version: u32,
    payload: &[u8],
) -> Result<()> {
    let mut writer = StructWriter::new(output);
    writer.write_u32(magic)?;
    writer.write_u32(version)?;
    writer.write_bytes(payload)?;
    writer.close()
}

/// Read and verify a framed payload.
pub fn read_framed<R: StorageInput>(input: R, magic: u32, version: u32) -> Result<Vec<u8>> {
    let mut reader = StructReader::new(input)?;

    let found_magic = reader.read_u32()?;
    if found_magic != magic {
        return Err(StorageError::Corrupted(format!(
            "bad magic {found_magic:08x}, expected {magic:08x}"
        ))
        .into());
    }

    let found_version = reader.read_u32()?;
    if found_version != version {
        return Err(StorageError::Corrupted(format!(
            "unsupported format version {found_version}"
        ))
        .into());
    }

    let payload = reader.read_bytes()?;
    reader.verify_checksum()?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorage;
    use crate::storage::traits::Storage;
    use std::io::Write as _;
    use tempfile::TempDir;

    const MAGIC: u32 = 0x464f_4c54;

    #[test]
    fn test_framed_payload() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let output = storage.create_output("a.seg").unwrap();
        write_framed(output, MAGIC, 1, b"segment bytes").unwrap();
        // 4 + 4 + 8 + 13 + 4
        assert_eq!(storage.file_size("a.seg").unwrap(), 33);

        let input = storage.open_input("a.seg").unwrap();
        assert_eq!(read_framed(input, MAGIC, 1).unwrap(), b"segment bytes");
    }

    #[test]
    fn test_corruption_detected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let output = storage.create_output("a.seg").unwrap();
        write_framed(output, MAGIC, 1, b"segment bytes").unwrap();

        let path = temp_dir.path().join("a.seg");
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xff;
        std::fs::write(&path, &bytes).unwrap();

        let input = storage.open_input("a.seg").unwrap();
        let err = read_framed(input, MAGIC, 1).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));

        let input = storage.open_input("a.seg").unwrap();
        assert!(read_framed(input, 0xdead_beef, 1).is_err());
    }

    #[test]
    fn test_truncated_length() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path());

        let mut output = storage.create_output("short.seg").unwrap();
        output.write_all(&MAGIC.to_le_bytes()).unwrap();
        output.write_all(&1u32.to_le_bytes()).unwrap();
        output.write_all(&1000u64.to_le_bytes()).unwrap();
        output.close().unwrap();

        let input = storage.open_input("short.seg").unwrap();
        let err = read_framed(input, MAGIC, 1).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining"));
    }
}
