use std::collections::HashMap;

/// Reassembles segments which complete out of order.
///
/// Bytes of segment `i` are appended only after every segment before it,
/// so the output is always a prefix of the playback-ordered stream.
pub(crate) struct Merger {
    buffers: HashMap<usize, Vec<u8>>,
    indexed: usize,
    output: Vec<u8>,
    pos: usize,
    size: usize,
}

impl Merger {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            indexed: 0,
            output: Vec::new(),
            pos: 0,
            size,
        }
    }

    pub(crate) fn write(&mut self, pos: usize, buf: Vec<u8>) {
        if pos == self.pos {
            self.output.extend_from_slice(&buf);
            self.pos += 1;
        } else {
            self.buffers.insert(pos, buf);
        }

        self.indexed += 1;
    }

    pub(crate) fn flush(&mut self) {
        while let Some(buf) = self.buffers.remove(&self.pos) {
            self.output.extend_from_slice(&buf);
            self.pos += 1;
        }
    }

    /// All segments received and appended.
    pub(crate) fn buffered(&self) -> bool {
        self.buffers.is_empty() && self.pos >= self.size
    }

    pub(crate) fn indexed(&self) -> usize {
        self.indexed
    }

    pub(crate) fn stored(&self) -> usize {
        self.output.len() + self.buffers.values().map(Vec::len).sum::<usize>()
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_order_writes_are_appended_in_order() {
        let mut merger = Merger::new(4);

        merger.write(2, b"cc".to_vec());
        merger.flush();
        merger.write(1, b"b".to_vec());
        merger.flush();
        assert_eq!(merger.stored(), 3);
        assert!(!merger.buffered());

        merger.write(0, b"a".to_vec());
        merger.flush();
        merger.write(3, b"ddd".to_vec());
        merger.flush();

        assert!(merger.buffered());
        assert_eq!(merger.indexed(), 4);
        assert_eq!(merger.into_inner(), b"abccddd");
    }

    #[test]
    fn test_every_completion_order_gives_same_bytes() {
        let parts = [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()];
        let orders = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        for order in orders {
            let mut merger = Merger::new(parts.len());

            for i in order {
                merger.write(i, parts[i].clone());
                merger.flush();
            }

            assert!(merger.buffered());
            assert_eq!(merger.into_inner(), b"onetwothree");
        }
    }

    #[test]
    fn test_missing_segment_is_not_buffered() {
        let mut merger = Merger::new(2);
        merger.write(1, b"x".to_vec());
        merger.flush();
        assert!(!merger.buffered());
        assert!(merger.into_inner().is_empty());
    }

    #[test]
    fn test_empty_stream() {
        assert!(Merger::new(0).buffered());
    }
}
