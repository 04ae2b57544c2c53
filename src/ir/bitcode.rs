//! Bitcode writer: serializes a module to a framed byte stream.
//!
//! The frame is a 4-byte magic plus a little-endian format version,
//! followed by the bincode encoding of the module. The stream is opened
//! immediately before writing and closed right after; any I/O failure
//! surfaces as a single error.

use std::io::{self, Read, Write};

use super::Module;

/// File magic: "MKBC".
pub const MAGIC: [u8; 4] = *b"MKBC";

/// Bumped whenever the serialized module layout changes.
pub const VERSION: u32 = 1;

pub fn write_bitcode<W: Write>(module: &Module, out: &mut W) -> io::Result<()> {
    out.write_all(&MAGIC)?;
    out.write_all(&VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut *out, module)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.flush()
}

pub fn read_bitcode<R: Read>(input: &mut R) -> io::Result<Module> {
    let mut magic = [0u8; 4];
    input.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "not a Marklar bitcode stream",
        ));
    }
    let mut version = [0u8; 4];
    input.read_exact(&mut version)?;
    let version = u32::from_le_bytes(version);
    if version != VERSION {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unsupported bitcode version {}", version),
        ));
    }
    bincode::deserialize_from(input).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::Builder;
    use crate::ir::Ty;

    fn sample_module() -> Module {
        let mut m = Module::new("sample");
        let f = m.add_function("main", Ty::Int(32), Vec::new(), false);
        let entry = m.new_block(f, "main");
        m.attach_block(f, entry);
        let mut b = Builder::new();
        b.set_insert_point(f, entry);
        let v = m.const_int(32, 3);
        b.build_ret(&mut m, v);
        m
    }

    #[test]
    fn test_stream_starts_with_magic_and_version() {
        let m = sample_module();
        let mut buf = Vec::new();
        write_bitcode(&m, &mut buf).expect("write to memory");
        assert_eq!(&buf[0..4], b"MKBC");
        assert_eq!(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]), VERSION);
        assert!(buf.len() > 8);
    }

    #[test]
    fn test_written_module_reads_back() {
        let m = sample_module();
        let mut buf = Vec::new();
        write_bitcode(&m, &mut buf).expect("write to memory");
        let read = read_bitcode(&mut buf.as_slice()).expect("read back");
        assert_eq!(read.name, "sample");
        assert_eq!(read.functions().count(), 1);
        assert_eq!(read.dump(), m.dump());
    }

    #[test]
    fn test_bad_magic_is_rejected() {
        let buf = b"XXXX\x01\x00\x00\x00".to_vec();
        assert!(read_bitcode(&mut buf.as_slice()).is_err());
    }
}
