use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// Opens a text input, transparently peeling off GZIP/BGZF layers.
///
/// Genome indexes, region tables and phenotype sheets are small, so callers
/// generally read the whole stream with [`read_to_string`].
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let mut reader: Box<dyn BufRead + Send> = Box::new(BufReader::new(file));

    // Nested gzip layers (e.g. re-compressed .gz.gz) are rare; bound the loop.
    const MAX_DEPTH: usize = 4;
    for _ in 0..MAX_DEPTH {
        let is_gzip = {
            let buf = reader.fill_buf()?;
            // GZIP magic: 1f 8b
            buf.len() >= 2 && buf[0] == 0x1f && buf[1] == 0x8b
        };
        if !is_gzip {
            break;
        }
        tracing::debug!(path = %path.display(), "detected GZIP/BGZF layer");
        // MultiGzDecoder handles BGZF and concatenated members
        reader = Box::new(BufReader::new(MultiGzDecoder::new(reader)));
    }
    Ok(reader)
}

/// Read a whole (possibly compressed) text file into memory.
pub fn read_to_string(path: &Path) -> io::Result<String> {
    let mut reader = open_input(path)?;
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.fai");
        std::fs::write(&path, "chr1\t1000\n").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "chr1\t1000\n");
    }

    #[test]
    fn decompresses_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("genome.fai.gz");
        {
            let file = File::create(&path).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"chr1\t1000\nchr2\t500\n").unwrap();
            encoder.finish().unwrap();
        }
        assert_eq!(read_to_string(&path).unwrap(), "chr1\t1000\nchr2\t500\n");
    }

    #[test]
    fn empty_file_is_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "").unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "");
    }
}
