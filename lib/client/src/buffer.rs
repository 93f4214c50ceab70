use std::io;

/// A byte FIFO over a plain vector. Data is appended at the tail and read
/// from the head; consumed space at the front is reclaimed by `compact`,
/// or automatically once the buffer drains. The incoming framer relies on
/// the compaction behaviour to keep a partial message at the start of the
/// buffer between reads.
pub struct Buffer {
    data: Vec<u8>,
    head: usize,
}

impl Buffer {
    #[inline]
    pub fn new() -> Buffer {
        Buffer { data: Vec::new(), head: 0 }
    }

    /// The number of unread bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.head
    }

    /// Returns true in case the buffer has no unread bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.data.len()
    }

    /// Slice containing the unread data.
    #[inline]
    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.head..]
    }

    /// Advance the head past `count` consumed bytes.
    #[inline]
    pub fn consume(&mut self, count: usize) {
        debug_assert!(count <= self.len());
        self.head += count;
        if self.head == self.data.len() {
            self.data.clear();
            self.head = 0;
        }
    }

    /// Move any unread tail to the physical start of the buffer.
    #[inline]
    pub fn compact(&mut self) {
        if self.head > 0 {
            self.data.drain(..self.head);
            self.head = 0;
        }
    }

    /// Append bytes at the tail.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.head = 0;
    }

    /// Read once from the supplied reader into `headroom` bytes of fresh
    /// tail space. Returns the byte count; zero means end of stream.
    pub fn ingress_once<R: io::Read>(&mut self, mut reader: R, headroom: usize) -> io::Result<usize> {
        self.compact();
        let len = self.data.len();
        self.data.resize(len + headroom, 0);
        match reader.read(&mut self.data[len..]) {
            Ok(count) => {
                self.data.truncate(len + count);
                Ok(count)
            }
            Err(err) => {
                self.data.truncate(len);
                Err(err)
            }
        }
    }

    /// Write the contents of the buffer to the supplied writer, consuming
    /// what was accepted. Drains fully unless the writer errors out.
    pub fn egress<W: io::Write>(&mut self, mut writer: W) -> io::Result<usize> {
        let orig_len = self.len();

        while self.len() > 0 {
            let write_count = writer.write(self.read_slice())?;

            if write_count == 0 {
                return Err(io::ErrorKind::WriteZero.into());
            }

            self.consume(write_count);
        }

        Ok(orig_len - self.len())
    }
}
