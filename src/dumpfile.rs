//! Dump files
//!
//! A dump is stored either as the raw concatenation of its SysEx frames or
//! as text with one frame per line in upper-case hex pairs
//! (`F0 47 7F 6D ... F7`). Both forms are read back through the
//! [framer](crate::framer), so foreign frames and junk between frames are
//! skipped.

use std::io::{BufReader, Read, Write};

use tracing::{debug, warn};

use crate::error::Result;
use crate::framer::{read_sysex, SysexFilter, SysexFramer};
use crate::sysex::SysexMessage;

/// On-disk dump representation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DumpFormat {
    #[default]
    Binary,
    /// One hex line per frame
    Ascii,
}

impl DumpFormat {
    pub fn from_ascii_flag(ascii: bool) -> Self {
        if ascii {
            DumpFormat::Ascii
        } else {
            DumpFormat::Binary
        }
    }
}

/// Hex text allowed per dump byte: two digits and a separator, CR LF at line ends.
const HEX_CHARS_PER_BYTE: u64 = 4;

/// Load the EWI USB frames of a dump, scanning at most `max_size` frame bytes.
///
/// Hex text is read no further than needed to decode `max_size` bytes.
pub fn load_dump<R: Read>(reader: R, format: DumpFormat, max_size: usize) -> Result<Vec<SysexMessage>> {
    match format {
        DumpFormat::Binary => read_sysex(reader, Some(SysexFilter::EWI_USB), max_size),
        DumpFormat::Ascii => read_hex_sysex(reader, max_size),
    }
}

/// Decode whitespace separated hex tokens into the framer.
///
/// A token that is not valid hex is skipped and drops the frame it
/// interrupts.
fn read_hex_sysex<R: Read>(reader: R, max_size: usize) -> Result<Vec<SysexMessage>> {
    let text_limit = (max_size as u64).saturating_mul(HEX_CHARS_PER_BYTE);
    let mut text = BufReader::new(reader.take(text_limit)).bytes();

    let mut framer = SysexFramer::with_filter(SysexFilter::EWI_USB);
    let mut frames = Vec::new();
    let mut token = Vec::new();
    let mut scanned = 0;

    while scanned < max_size {
        let next = text.next().transpose()?;
        if let Some(c) = next {
            if !c.is_ascii_whitespace() {
                token.push(c);
                continue;
            }
        }

        if !token.is_empty() {
            match hex::decode(&token) {
                Ok(bytes) => {
                    for byte in bytes.into_iter().take(max_size - scanned) {
                        scanned += 1;
                        if let Some(msg) = framer.push(byte) {
                            frames.push(msg);
                        }
                    }
                }
                Err(e) => {
                    warn!("Skipping invalid hex '{}': {}", String::from_utf8_lossy(&token), e);
                    framer.reset();
                }
            }
            token.clear();
        }

        if next.is_none() {
            break;
        }
    }

    debug!("Decoded {} bytes of hex text", scanned);
    Ok(frames)
}

/// Write `frames` in the given format.
pub fn write_dump<W: Write>(mut writer: W, frames: &[SysexMessage], format: DumpFormat) -> Result<()> {
    for msg in frames {
        match format {
            DumpFormat::Binary => writer.write_all(msg.as_bytes())?,
            DumpFormat::Ascii => writeln!(writer, "{}", msg)?,
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io;

    fn frames() -> Vec<SysexMessage> {
        vec![
            SysexMessage::from_bytes(vec![0xF0, 0x47, 0x7F, 0x6D, 0x00, 0x00, 0x7F, 0x10, 0x05, 0xF7]).unwrap(),
            SysexMessage::from_bytes(vec![0xF0, 0x47, 0x7F, 0x6D, 0x02, 0x00, 0x7F, 0x10, 0x40, 0xF7]).unwrap(),
        ]
    }

    #[test]
    fn binary_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ewi.syx");

        write_dump(File::create(&path).unwrap(), &frames(), DumpFormat::Binary).unwrap();
        assert_eq!(std::fs::read(&path).unwrap().len(), 20);

        let loaded = load_dump(File::open(&path).unwrap(), DumpFormat::Binary, 1024).unwrap();
        assert_eq!(loaded, frames());
    }

    #[test]
    fn ascii_file_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ewi.txt");

        write_dump(File::create(&path).unwrap(), &frames(), DumpFormat::Ascii).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("F0 47 7F 6D 00 00 7F 10 05 F7"));

        let loaded = load_dump(File::open(&path).unwrap(), DumpFormat::Ascii, 1024).unwrap();
        assert_eq!(loaded, frames());
    }

    #[test]
    fn ascii_tolerates_lower_case_and_foreign_frames() {
        let text = "f0 43 10 4c 00 f7\nf0 47 7f 6d 00 00 7f 10 05 f7\n\n";
        let loaded = load_dump(text.as_bytes(), DumpFormat::Ascii, 1024).unwrap();
        assert_eq!(loaded, frames()[..1].to_vec());
    }

    #[test]
    fn ascii_skips_bad_hex_tokens() {
        let text = "F0 47 ZZ F7\nF0 47 7F 6D 00 00 7F 10 05 F7\nF0 4\n";
        let loaded = load_dump(text.as_bytes(), DumpFormat::Ascii, 1024).unwrap();
        assert_eq!(loaded, frames()[..1].to_vec());
    }

    /// Endless `00 00 00 ...` text, counting what is read.
    struct EndlessHex {
        consumed: usize,
    }

    impl Read for EndlessHex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = b"00 "[(self.consumed + i) % 3];
            }
            self.consumed += buf.len();
            Ok(buf.len())
        }
    }

    #[test]
    fn ascii_reads_no_further_than_budget() {
        let mut source = EndlessHex { consumed: 0 };
        let loaded = load_dump(&mut source, DumpFormat::Ascii, 1024).unwrap();

        assert!(loaded.is_empty());
        assert!(source.consumed <= 1024 * 4, "read {} bytes", source.consumed);
    }

    #[test]
    fn ascii_scan_limit_cuts_off_late_frames() {
        let mut text = Vec::new();
        write_dump(&mut text, &frames(), DumpFormat::Ascii).unwrap();
        let loaded = load_dump(text.as_slice(), DumpFormat::Ascii, 15).unwrap();
        assert_eq!(loaded, frames()[..1].to_vec());
    }

    #[test]
    fn ascii_whitespace_only_input_terminates() {
        let blank = io::repeat(b'\n');
        let loaded = load_dump(blank, DumpFormat::Ascii, 64).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn binary_skips_foreign_frames() {
        let mut data = vec![0x00, 0xF0, 0x41, 0x10, 0x42, 0xF7];
        data.extend_from_slice(frames()[1].as_bytes());
        let loaded = load_dump(data.as_slice(), DumpFormat::Binary, 1024).unwrap();
        assert_eq!(loaded, frames()[1..].to_vec());
    }

    #[test]
    fn scan_limit_cuts_off_late_frames() {
        let mut data = Vec::new();
        write_dump(&mut data, &frames(), DumpFormat::Binary).unwrap();
        let loaded = load_dump(data.as_slice(), DumpFormat::Binary, 15).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn format_from_flag() {
        assert_eq!(DumpFormat::from_ascii_flag(true), DumpFormat::Ascii);
        assert_eq!(DumpFormat::from_ascii_flag(false), DumpFormat::default());
    }
}
