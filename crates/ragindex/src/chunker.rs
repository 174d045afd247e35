//! Splits document text into bounded, overlapping chunks on semantic
//! separators, in presentation order.

const SEPARATORS: [&str; 5] = ["\n\n", "\n", "。", ".", " "];

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size: 0,
        }
    }

    pub fn with_min_chunk_size(mut self, min_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self
    }

    /// Splits `text` starting at cursor `a=0`, counting in characters (code
    /// points), not bytes — the separator list includes multi-byte
    /// characters and `chunk_size`/`chunk_overlap` are defined over the
    /// original's character indices. At each step, `b = a + chunk_size`; if
    /// `b` reaches the end the remainder is emitted and chunking stops.
    /// Otherwise the rightmost separator occurrence starting in `[a + s/2,
    /// b)` becomes the break point (searched in separator-priority order);
    /// absent any match, the break point is `b`. The next cursor is
    /// `break - overlap`.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_count = offsets.len();
        if char_count == 0 {
            return Vec::new();
        }
        if char_count < self.min_chunk_size {
            return Vec::new();
        }

        let byte_at = |i: usize| -> usize {
            if i >= char_count {
                text.len()
            } else {
                offsets[i]
            }
        };

        let s = self.chunk_size;
        let o = self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut a = 0usize;

        loop {
            let b = a + s;
            if b >= char_count {
                chunks.push(text[byte_at(a)..].to_string());
                break;
            }

            let break_point = self.find_break_point(text, &offsets, byte_at, a, b, char_count);
            chunks.push(text[byte_at(a)..byte_at(break_point)].to_string());

            let next = break_point.saturating_sub(o);
            a = next.max(a + 1);
        }

        chunks
    }

    /// Searches backwards from character index `b` for the rightmost
    /// separator whose start lies in `[a + s/2, b)`, trying each separator
    /// in priority order. Returns a character index.
    fn find_break_point(
        &self,
        text: &str,
        offsets: &[usize],
        byte_at: impl Fn(usize) -> usize,
        a: usize,
        b: usize,
        char_count: usize,
    ) -> usize {
        let window_start = (a + self.chunk_size / 2).min(char_count);
        let window_end = b.min(char_count);

        if window_start >= window_end {
            return window_end;
        }

        let window_start_byte = byte_at(window_start);
        let window_end_byte = byte_at(window_end);
        let window = &text[window_start_byte..window_end_byte];

        for sep in SEPARATORS {
            if let Some(pos) = window.rfind(sep) {
                let byte_pos = window_start_byte + pos + sep.len();
                return byte_to_char_index(offsets, text.len(), byte_pos);
            }
        }
        window_end
    }
}

/// Maps a byte offset (assumed to be a char boundary) back to its character
/// index in `offsets`.
fn byte_to_char_index(offsets: &[usize], text_len: usize, byte_pos: usize) -> usize {
    if byte_pos >= text_len {
        return offsets.len();
    }
    offsets.binary_search(&byte_pos).unwrap_or(offsets.len())
}
