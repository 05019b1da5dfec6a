//! `MThd` chunk.

use crate::error::{Error, Result};

pub const MTHD: [u8; 4] = *b"MThd";
pub const MTRK: [u8; 4] = *b"MTrk";

/// Size of the `MThd` body.
pub const HEADER_LENGTH: u32 = 6;

/// Chunk signature + length + body.
pub const HEADER_CHUNK_SIZE: usize = 14;

/// Largest metrical division (the high bit selects SMPTE timing).
pub const MAX_DIVISION: u16 = 0x7FFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One track holding all channels.
    SingleTrack,
    /// Several tracks played simultaneously.
    Parallel,
}

impl Format {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Format::SingleTrack),
            1 => Ok(Format::Parallel),
            other => Err(Error::UnsupportedFormat(other)),
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            Format::SingleTrack => 0,
            Format::Parallel => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    pub ntrks: u16,
    /// Ticks per quarter note.
    pub division: u16,
}

impl Header {
    pub fn new(format: Format, ntrks: u16, division: u16) -> Result<Self> {
        let header = Self {
            format,
            ntrks,
            division,
        };
        header.check_division()?;
        Ok(header)
    }

    fn check_division(&self) -> Result<()> {
        if self.division & 0x8000 != 0 {
            return Err(Error::UnsupportedTiming(self.division));
        }
        if self.division == 0 {
            return Err(Error::ZeroDivision);
        }
        Ok(())
    }

    /// Parse the first [`HEADER_CHUNK_SIZE`] bytes of a file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_CHUNK_SIZE {
            return Err(Error::Truncated {
                context: "MThd chunk",
                offset: bytes.len(),
            });
        }
        let signature = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if signature != MTHD {
            return Err(Error::BadSignature {
                expected: "MThd",
                found: signature,
            });
        }
        let length = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if length != HEADER_LENGTH {
            return Err(Error::BadHeaderLength(length));
        }
        let format = Format::from_u16(u16::from_be_bytes([bytes[8], bytes[9]]))?;
        let header = Self {
            format,
            ntrks: u16::from_be_bytes([bytes[10], bytes[11]]),
            division: u16::from_be_bytes([bytes[12], bytes[13]]),
        };
        header.check_division()?;
        Ok(header)
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&MTHD);
        out.extend_from_slice(&HEADER_LENGTH.to_be_bytes());
        out.extend_from_slice(&self.format.as_u16().to_be_bytes());
        out.extend_from_slice(&self.ntrks.to_be_bytes());
        out.extend_from_slice(&self.division.to_be_bytes());
    }
}

/// Signature-only check for file-type discovery. Does not validate the rest.
#[inline]
pub fn is_valid_header(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == MTHD
}
