//! Splitting files into chunk bodies.

use std::{
    fs::File,
    io::{self, BufReader, ErrorKind, Read},
    path::Path,
};

use bytes::{Bytes, BytesMut};
use cairn_primitives::CHUNK_SIZE;

/// Iterator over the chunk bodies of a byte stream.
///
/// Every body is exactly [`CHUNK_SIZE`] bytes except the last, which is
/// shorter. A stream whose length is a multiple of [`CHUNK_SIZE`] (the empty
/// stream included) ends with an empty body, so the last chunk always marks
/// the end of the file.
#[derive(Debug)]
pub struct Chunker<R> {
    reader: R,
    done: bool,
}

impl Chunker<BufReader<File>> {
    /// Chunk a file, reading one body per [`next`](Iterator::next) call.
    /// Blocking.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> Chunker<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    fn fill(&mut self) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(CHUNK_SIZE);
        let mut filled = 0;
        while filled < CHUNK_SIZE {
            let Some(rest) = buf.get_mut(filled..) else {
                break;
            };
            match self.reader.read(rest) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }
}

impl<R: Read> Iterator for Chunker<R> {
    type Item = io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let chunk = self.fill();
        match &chunk {
            Ok(body) if body.len() == CHUNK_SIZE => {}
            _ => self.done = true,
        }
        Some(chunk)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sizes(len: usize) -> Vec<usize> {
        let data = vec![0xAB; len];
        Chunker::new(data.as_slice())
            .map(|chunk| chunk.unwrap().len())
            .collect()
    }

    #[test]
    fn test_split_sizes() {
        assert_eq!(sizes(150_000), vec![65_536, 65_536, 18_928]);
        assert_eq!(sizes(131_072), vec![65_536, 65_536, 0]);
        assert_eq!(sizes(0), vec![0]);
        assert_eq!(sizes(1), vec![1]);
        assert_eq!(sizes(65_535), vec![65_535]);
        assert_eq!(sizes(65_536), vec![65_536, 0]);
    }

    #[test]
    fn test_count_matches_formula() {
        for len in [0, 10, 65_536, 100_000, 196_608, 200_000] {
            let expected = cairn_primitives::chunk_count(len as u64) as usize;
            assert_eq!(sizes(len).len(), expected, "len {len}");
        }
    }

    #[test]
    fn test_concatenation_restores_input() {
        let data: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let joined: Vec<u8> = Chunker::new(data.as_slice())
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();
        assert_eq!(joined, data);
    }

    /// Reader that hands out at most a few bytes per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.0.len()).min(7);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_short_reads_fill_chunks() {
        let data = vec![1u8; 70_000];
        let lens: Vec<_> = Chunker::new(Trickle(&data))
            .map(|c| c.unwrap().len())
            .collect();
        assert_eq!(lens, vec![65_536, 4_464]);
    }

    #[test]
    fn test_open_reads_lazily() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![9u8; 131_072]).unwrap();

        let mut chunker = Chunker::open(file.path()).unwrap();
        assert_eq!(chunker.next().unwrap().unwrap().len(), 65_536);
        // Bytes appended after the first read show up in later chunks.
        file.write_all(&[1u8; 10]).unwrap();
        file.flush().unwrap();
        let rest: Vec<_> = chunker.map(|c| c.unwrap().len()).collect();
        assert_eq!(rest, vec![65_536, 10]);

        assert!(Chunker::open(&file.path().with_extension("missing")).is_err());
    }
}
