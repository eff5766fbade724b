use std::io::{self, Read};

use memchr::{memchr, memchr2, memchr3};

/// How a scan over the [`StreamBuffer`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// More data may follow in the current section.
    None,
    /// The delimiter was matched and consumed.
    EndOfSection,
    /// The underlying stream has no more bytes.
    EndOfStream,
}

/// The outcome of one [`StreamBuffer`] primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes consumed by this call, delimiters excluded.
    pub read: usize,
    pub completion: Completion,
    /// An invalid token, or a byte outside the allowed set, sits at the
    /// front of the window. It is not consumed.
    pub invalid: bool,
}

impl ReadOutcome {
    fn data(read: usize) -> Self {
        ReadOutcome {
            read,
            completion: Completion::None,
            invalid: false,
        }
    }

    fn end_of_section(read: usize) -> Self {
        ReadOutcome {
            read,
            completion: Completion::EndOfSection,
            invalid: false,
        }
    }

    fn end_of_stream(read: usize) -> Self {
        ReadOutcome {
            read,
            completion: Completion::EndOfStream,
            invalid: false,
        }
    }

    fn invalid(read: usize) -> Self {
        ReadOutcome {
            read,
            completion: Completion::None,
            invalid: true,
        }
    }

    pub fn is_end_of_section(&self) -> bool {
        self.completion == Completion::EndOfSection
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.completion == Completion::EndOfStream
    }
}

enum Hit {
    /// A token fully matches at `at`, relative to the window start.
    Full { at: usize, len: usize, delimiter: bool },
    /// A token may start at `at` but the window ends before it can be decided.
    Partial { at: usize },
    Miss,
}

/// A fixed-capacity lookahead window over a [`Read`] source.
///
/// The window is refilled from the source only when a primitive needs more
/// bytes than it holds, so memory use is bounded by the capacity no matter
/// how long the stream is. Delimiters and invalid tokens are matched across
/// refills; their length can never exceed the capacity.
pub struct StreamBuffer<R> {
    reader: R,
    buf: Box<[u8]>,
    start: usize,
    end: usize,
    eof: bool,
    consumed: u64,
}

impl<R: Read> StreamBuffer<R> {
    /// Creates a buffer with a window of `capacity` bytes.
    pub fn new(reader: R, capacity: usize) -> crate::Result<Self> {
        if capacity < 1 {
            return Err(crate::Error::invalid_argument("buffer size must be at least 1"));
        }

        Ok(StreamBuffer {
            reader,
            buf: vec![0; capacity].into_boxed_slice(),
            start: 0,
            end: 0,
            eof: false,
            consumed: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes consumed from the stream so far.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// Returns `true` until the first byte has been consumed.
    pub fn is_beginning_of_stream(&self) -> bool {
        self.consumed == 0
    }

    /// Returns `true` once the source is exhausted and the window is empty.
    pub fn is_end_of_stream(&self) -> bool {
        self.eof && self.start == self.end
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Returns the source. Bytes still held in the window are lost.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Returns `true` if the unconsumed bytes begin with `candidate`.
    ///
    /// The window is refilled as far as needed to compare the whole
    /// candidate. Returns `false` if the stream ends first. Never consumes.
    pub fn starts_with(&mut self, candidate: &[u8]) -> crate::Result<bool> {
        self.check_token(candidate)?;
        self.fill(candidate.len())?;
        Ok(self.window().starts_with(candidate))
    }

    /// Copies up to `dest.len()` bytes, stopping before any of
    /// `invalid_tokens`.
    pub fn read(&mut self, dest: &mut [u8], invalid_tokens: &[&[u8]]) -> crate::Result<ReadOutcome> {
        self.scan_copy(dest, None, invalid_tokens)
    }

    /// Copies up to `dest.len()` bytes, stopping at `delimiter` or before
    /// any of `invalid_tokens`.
    ///
    /// A matched delimiter is consumed but never copied. When a delimiter and
    /// an invalid token match at the same position the longer one wins, and
    /// the window is extended before committing while the longer one could
    /// still match.
    pub fn read_to(
        &mut self,
        dest: &mut [u8],
        delimiter: &[u8],
        invalid_tokens: &[&[u8]],
    ) -> crate::Result<ReadOutcome> {
        self.scan_copy(dest, Some(delimiter), invalid_tokens)
    }

    /// Consumes bytes up to and including `delimiter`, requiring every byte
    /// before it to be one of `allowed`.
    ///
    /// A disallowed byte yields an invalid outcome and is left in place.
    pub fn skip_to(&mut self, delimiter: &[u8], allowed: &[u8]) -> crate::Result<ReadOutcome> {
        self.check_token(delimiter)?;

        let mut skipped = 0;
        loop {
            if self.starts_with(delimiter)? {
                self.consume(delimiter.len());
                return Ok(ReadOutcome::end_of_section(skipped));
            }

            if self.start == self.end {
                self.fill(1)?;
            }

            let window = self.window();
            if window.is_empty() || (self.eof && delimiter.starts_with(window)) {
                return Ok(ReadOutcome::end_of_stream(skipped));
            }

            if !allowed.contains(&window[0]) {
                return Ok(ReadOutcome::invalid(skipped));
            }

            self.consume(1);
            skipped += 1;
        }
    }

    pub(crate) fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.end - self.start);
        self.start += n;
        self.consumed += n as u64;
    }

    fn window(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    fn check_token(&self, token: &[u8]) -> crate::Result<()> {
        if token.is_empty() {
            return Err(crate::Error::invalid_argument("delimiter tokens must not be empty"));
        }

        if token.len() > self.capacity() {
            return Err(crate::Error::invalid_argument(format!(
                "token of {} bytes does not fit in a {} byte buffer",
                token.len(),
                self.capacity()
            )));
        }

        Ok(())
    }

    /// Makes at least `needed` bytes available unless the stream ends first.
    fn fill(&mut self, needed: usize) -> crate::Result<()> {
        let needed = needed.min(self.capacity());

        if self.eof || self.end - self.start >= needed {
            return Ok(());
        }

        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }

        while self.end < needed {
            match self.reader.read(&mut self.buf[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.end += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(crate::Error::StreamReadFailed(err)),
            }
        }

        Ok(())
    }

    fn copy_out(&mut self, dest: &mut [u8], limit: usize) -> usize {
        let n = limit.min(dest.len());
        dest[..n].copy_from_slice(&self.buf[self.start..self.start + n]);
        self.consume(n);
        n
    }

    fn scan_copy(
        &mut self,
        dest: &mut [u8],
        delimiter: Option<&[u8]>,
        invalid_tokens: &[&[u8]],
    ) -> crate::Result<ReadOutcome> {
        let mut longest = 0;
        for (token, _) in candidates(delimiter, invalid_tokens) {
            self.check_token(token)?;
            longest = longest.max(token.len());
        }

        if dest.is_empty() {
            return Ok(ReadOutcome::data(0));
        }

        if self.start == self.end {
            self.fill(1)?;
            if self.start == self.end {
                return Ok(ReadOutcome::end_of_stream(0));
            }
        }

        loop {
            match self.scan(delimiter, invalid_tokens) {
                Hit::Miss => {
                    let available = self.end - self.start;
                    return Ok(ReadOutcome::data(self.copy_out(dest, available)));
                }
                Hit::Partial { at } if at > 0 => {
                    return Ok(ReadOutcome::data(self.copy_out(dest, at)));
                }
                Hit::Partial { .. } => {
                    // Only a refill can decide a candidate at the window front.
                    self.fill(longest)?;
                }
                Hit::Full { at, len, delimiter } => {
                    let n = self.copy_out(dest, at);
                    if n < at {
                        return Ok(ReadOutcome::data(n));
                    }

                    if delimiter {
                        self.consume(len);
                        return Ok(ReadOutcome::end_of_section(n));
                    }

                    return Ok(ReadOutcome::invalid(n));
                }
            }
        }
    }

    fn scan(&self, delimiter: Option<&[u8]>, invalid_tokens: &[&[u8]]) -> Hit {
        let mut firsts = [0u8; 3];
        let mut n_firsts = 0;
        let mut every_byte = false;
        for (token, _) in candidates(delimiter, invalid_tokens) {
            let first = token[0];
            if firsts[..n_firsts].contains(&first) {
                continue;
            }
            if n_firsts == firsts.len() {
                every_byte = true;
                break;
            }
            firsts[n_firsts] = first;
            n_firsts += 1;
        }

        let window = self.window();
        let mut pos = 0;

        while pos < window.len() {
            if !every_byte {
                match find_candidate(&window[pos..], &firsts[..n_firsts]) {
                    Some(offset) => pos += offset,
                    None => return Hit::Miss,
                }
            }

            let rest = &window[pos..];
            let mut full: Option<(usize, bool)> = None;
            let mut partial = 0;

            for (token, is_delimiter) in candidates(delimiter, invalid_tokens) {
                if rest.len() >= token.len() {
                    if rest.starts_with(token) && full.map_or(true, |(len, _)| token.len() > len) {
                        full = Some((token.len(), is_delimiter));
                    }
                } else if !self.eof && token.starts_with(rest) {
                    partial = partial.max(token.len());
                }
            }

            match full {
                Some((len, _)) if partial > len => return Hit::Partial { at: pos },
                Some((len, delimiter)) => return Hit::Full { at: pos, len, delimiter },
                None if partial > 0 => return Hit::Partial { at: pos },
                None => pos += 1,
            }
        }

        Hit::Miss
    }
}

/// Yields the delimiter, flagged `true`, followed by the invalid tokens.
fn candidates<'t>(
    delimiter: Option<&'t [u8]>,
    invalid_tokens: &'t [&'t [u8]],
) -> impl Iterator<Item = (&'t [u8], bool)> + 't {
    delimiter
        .into_iter()
        .map(|token| (token, true))
        .chain(invalid_tokens.iter().map(|token| (*token, false)))
}

fn find_candidate(haystack: &[u8], firsts: &[u8]) -> Option<usize> {
    match *firsts {
        [] => None,
        [a] => memchr(a, haystack),
        [a, b] => memchr2(a, b, haystack),
        [a, b, c] => memchr3(a, b, c, haystack),
        _ => haystack.iter().position(|byte| firsts.contains(byte)),
    }
}
