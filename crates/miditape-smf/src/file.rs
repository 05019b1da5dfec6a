//! Whole-file decode and encode.

use crate::error::{Error, Result};
use crate::header::{Format, Header, HEADER_CHUNK_SIZE, MTRK};
use crate::track::{decode_track, encode_track, Track};
use std::path::Path;
use tracing::{debug, warn};

/// A chunk other than `MTrk`, carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlienChunk {
    pub id: [u8; 4],
    pub data: Vec<u8>,
    /// Number of tracks that come before it in the file.
    pub position: usize,
}

/// A decoded Standard MIDI File.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smf {
    pub header: Header,
    pub tracks: Vec<Track>,
    /// Unknown chunks in file order.
    pub alien_chunks: Vec<AlienChunk>,
}

impl Smf {
    pub fn new(header: Header, tracks: Vec<Track>) -> Self {
        Self {
            header,
            tracks,
            alien_chunks: Vec::new(),
        }
    }

    /// An empty format 0 file.
    pub fn single_track(division: u16) -> Result<Self> {
        Ok(Self::new(
            Header::new(Format::SingleTrack, 1, division)?,
            vec![Track::new()],
        ))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        decode(&data)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let bytes = encode(self)?;
        std::fs::write(path.as_ref(), bytes)?;
        Ok(())
    }
}

/// Decode a complete file.
pub fn decode(bytes: &[u8]) -> Result<Smf> {
    let header = Header::parse(bytes)?;
    let mut tracks = Vec::with_capacity(header.ntrks as usize);
    let mut alien_chunks = Vec::new();
    let mut offset = HEADER_CHUNK_SIZE;

    while offset < bytes.len() {
        if bytes.len() - offset < 8 {
            return Err(Error::Truncated {
                context: "chunk header",
                offset,
            });
        }
        let id = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        let length = u32::from_be_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        let body_start = offset + 8;
        let Some(body) = bytes.get(body_start..body_start + length) else {
            return Err(Error::Truncated {
                context: "track chunk",
                offset: bytes.len(),
            });
        };

        if id == MTRK {
            tracks.push(decode_track(body, tracks.len())?);
        } else {
            debug!(
                "Keeping unknown chunk {:?} ({} bytes)",
                String::from_utf8_lossy(&id),
                length
            );
            alien_chunks.push(AlienChunk {
                id,
                data: body.to_vec(),
                position: tracks.len(),
            });
        }
        offset = body_start + length;
    }

    if tracks.len() != header.ntrks as usize {
        warn!(
            "Header declares {} tracks, found {}",
            header.ntrks,
            tracks.len()
        );
    }
    if header.format == Format::SingleTrack && tracks.len() > 1 {
        warn!("Format 0 file with {} tracks", tracks.len());
    }

    debug!(
        "Decoded SMF: format {}, {} tracks, {} ticks per quarter",
        header.format.as_u16(),
        tracks.len(),
        header.division
    );

    Ok(Smf {
        header,
        tracks,
        alien_chunks,
    })
}

/// Encode a complete file. The track count is taken from `smf.tracks`.
pub fn encode(smf: &Smf) -> Result<Vec<u8>> {
    let ntrks = u16::try_from(smf.tracks.len())
        .map_err(|_| Error::InvalidMessage(format!("{} tracks", smf.tracks.len())))?;
    let header = Header::new(smf.header.format, ntrks, smf.header.division)?;

    let mut out = Vec::new();
    header.write(&mut out);

    let mut aliens = smf.alien_chunks.iter().peekable();
    let mut body = Vec::new();
    for (i, track) in smf.tracks.iter().enumerate() {
        while let Some(chunk) = aliens.next_if(|c| c.position <= i) {
            write_chunk(&mut out, chunk.id, &chunk.data)?;
        }
        body.clear();
        encode_track(&mut body, track)?;
        write_chunk(&mut out, MTRK, &body)?;
    }
    for chunk in aliens {
        write_chunk(&mut out, chunk.id, &chunk.data)?;
    }
    Ok(out)
}

fn write_chunk(out: &mut Vec<u8>, id: [u8; 4], body: &[u8]) -> Result<()> {
    let length = u32::try_from(body.len()).map_err(|_| Error::TrackTooLong(body.len() as u64))?;
    out.extend_from_slice(&id);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(body);
    Ok(())
}
