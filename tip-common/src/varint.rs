// Variable-length integer and string encoding used by the message codec
// Format: [num_bytes: u8][value bytes in big-endian], zero is a single 0 byte

use std::io::{self, Read};

/// Append a varint to a byte vector
/// Returns number of bytes written
pub fn put_varint(buf: &mut Vec<u8>, value: u64) -> usize {
    let no_bytes = (8 - value.leading_zeros() / 8) as usize;
    buf.push(no_bytes as u8);
    buf.extend_from_slice(&value.to_be_bytes()[8 - no_bytes..]);
    no_bytes + 1
}

/// Append a length-prefixed UTF-8 string to a byte vector
pub fn put_str(buf: &mut Vec<u8>, value: &str) -> usize {
    let header = put_varint(buf, value.len() as u64);
    buf.extend_from_slice(value.as_bytes());
    header + value.len()
}

/// Read a value with variable-length encoding
/// Returns (value, bytes_read)
pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<(u64, usize)> {
    let mut no_bytes_buf = [0u8; 1];
    reader.read_exact(&mut no_bytes_buf)?;
    let no_bytes = no_bytes_buf[0] as usize;

    if no_bytes > 8 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("varint length byte {no_bytes} exceeds 8"),
        ));
    }

    let mut value_buf = [0u8; 8];
    reader.read_exact(&mut value_buf[8 - no_bytes..])?;

    Ok((u64::from_be_bytes(value_buf), no_bytes + 1))
}

/// Read a length-prefixed UTF-8 string
///
/// The declared length is never trusted for allocation: bytes are pulled
/// through `take` and a short read is reported as `UnexpectedEof`.
pub fn read_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let (len, _) = read_varint(reader)?;
    let mut bytes = Vec::new();
    reader.take(len).read_to_end(&mut bytes)?;
    if bytes.len() as u64 != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("string declared {len} bytes, found {}", bytes.len()),
        ));
    }
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
