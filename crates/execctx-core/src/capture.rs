//! Bounded capture of diagnostic output.

/// Default limit for each of the retained prefix and suffix (32 KiB)
pub const DEFAULT_CAPTURE_LIMIT: usize = 32 << 10;

/// A sink which retains the first `limit` bytes and the last `limit` bytes
/// written to it, counting everything in between as skipped.
///
/// [`to_bytes`](Self::to_bytes) reconstructs the retained output with a
/// marker in place of the omitted middle, so memory stays bounded at
/// `2 * limit` however much the process prints.
#[derive(Debug, Clone)]
pub struct PrefixSuffixBuffer {
    limit: usize,
    prefix: Vec<u8>,
    // ring buffer once suffix.len() == limit
    suffix: Vec<u8>,
    // next write position in the ring, which is also the oldest byte
    suffix_offset: usize,
    skipped: u64,
}

impl Default for PrefixSuffixBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_LIMIT)
    }
}

impl PrefixSuffixBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            prefix: Vec::new(),
            suffix: Vec::new(),
            suffix_offset: 0,
            skipped: 0,
        }
    }

    /// Number of bytes discarded between prefix and suffix
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Number of bytes currently held
    pub fn retained(&self) -> usize {
        self.prefix.len() + self.suffix.len()
    }

    /// Append bytes, always accepting all of them
    pub fn push(&mut self, data: &[u8]) {
        let mut data = fill(&mut self.prefix, self.limit, data);

        // Only the last `limit` bytes can survive into the suffix.
        if data.len() > self.limit {
            let overage = data.len() - self.limit;
            data = &data[overage..];
            self.skipped += overage as u64;
        }
        data = fill(&mut self.suffix, self.limit, data);

        // The suffix is full if anything is left. Overwrite it in a circle.
        while !data.is_empty() {
            let n = (self.limit - self.suffix_offset).min(data.len());
            self.suffix[self.suffix_offset..self.suffix_offset + n].copy_from_slice(&data[..n]);
            data = &data[n..];
            self.skipped += n as u64;
            self.suffix_offset += n;
            if self.suffix_offset == self.limit {
                self.suffix_offset = 0;
            }
        }
    }

    /// Reconstruct the retained output in write order.
    ///
    /// When bytes were skipped, a `... omitting N bytes ...` line separates
    /// the prefix from the suffix.
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.skipped == 0 {
            let mut out = Vec::with_capacity(self.retained());
            out.extend_from_slice(&self.prefix);
            out.extend_from_slice(&self.suffix);
            return out;
        }

        let marker = format!("\n... omitting {} bytes ...\n", self.skipped);
        let mut out = Vec::with_capacity(self.retained() + marker.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(marker.as_bytes());
        out.extend_from_slice(&self.suffix[self.suffix_offset..]);
        out.extend_from_slice(&self.suffix[..self.suffix_offset]);
        out
    }
}

/// Appends as much of `data` to `dst` as fits under `limit`, returning the rest
fn fill<'a>(dst: &mut Vec<u8>, limit: usize, data: &'a [u8]) -> &'a [u8] {
    let remain = limit.saturating_sub(dst.len());
    let add = remain.min(data.len());
    dst.extend_from_slice(&data[..add]);
    &data[add..]
}

impl std::io::Write for PrefixSuffixBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
