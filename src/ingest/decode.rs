use encoding_rs::{CoderResult, Decoder, Encoding};
use std::io::{self, Read};

const RAW_BUFFER: usize = 32 * 1024;
const OUT_BUFFER: usize = 64 * 1024;

/// Streams any `encoding_rs` encoding as UTF-8 bytes.
///
/// Malformed input is replaced with U+FFFD. A leading byte-order mark is removed.
pub struct DecodingReader<R> {
    inner: R,
    decoder: Decoder,
    raw: Vec<u8>,
    raw_pos: usize,
    raw_len: usize,
    out: Vec<u8>,
    out_pos: usize,
    out_len: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> DecodingReader<R> {
    pub fn new(inner: R, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            decoder: encoding.new_decoder_with_bom_removal(),
            raw: vec![0; RAW_BUFFER],
            raw_pos: 0,
            raw_len: 0,
            out: vec![0; OUT_BUFFER],
            out_pos: 0,
            out_len: 0,
            eof: false,
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        if self.raw_pos == self.raw_len && !self.eof {
            let n = self.inner.read(&mut self.raw)?;
            self.raw_pos = 0;
            self.raw_len = n;
            self.eof = n == 0;
        }

        let src = self.raw.get(self.raw_pos..self.raw_len).unwrap_or_default();
        let (result, read, written, _) = self.decoder.decode_to_utf8(src, &mut self.out, self.eof);
        self.raw_pos += read;
        self.out_pos = 0;
        self.out_len = written;

        if self.eof && result == CoderResult::InputEmpty {
            self.finished = true;
        }
        Ok(())
    }
}

impl<R: Read> Read for DecodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.out_pos < self.out_len {
                let pending = self.out.get(self.out_pos..self.out_len).unwrap_or_default();
                let n = pending.len().min(buf.len());
                if let (Some(dst), Some(src)) = (buf.get_mut(..n), pending.get(..n)) {
                    dst.copy_from_slice(src);
                }
                self.out_pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.fill()?;
        }
    }
}
