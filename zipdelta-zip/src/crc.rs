use crc::{Algorithm, Crc};
use std::io::Read;

/// The CRC-32 algorithm used by the ZIP file format.
pub const ZIP_CRC: Crc<u32> = Crc::<u32>::new(&Algorithm {
    width: 32,
    poly: 0x04c11db7,
    init: 0xffffffff,
    refin: true,
    refout: true,
    xorout: 0xffffffff,
    check: 0xcbf43926,
    residue: 0xdebb20e3,
});

/// Calculates the (ZIP) CRC-32 hash of the data within the given stream.
/// Reads until EOF.
pub fn crc_of_stream(mut stream: impl Read) -> std::io::Result<u32> {
    let mut digest = ZIP_CRC.digest();
    let mut buffer = [0u8; 4096];

    loop {
        let read_bytes = stream.read(&mut buffer)?;
        if read_bytes == 0 {
            return Ok(digest.finalize());
        }
        digest.update(&buffer[0..read_bytes]);
    }
}

/// Calculates the CRC-32 hash of a slice, using the same algorithm as ZIP.
pub fn crc_bytes(bytes: &[u8]) -> u32 {
    ZIP_CRC.checksum(bytes)
}
