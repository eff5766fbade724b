use std::fmt;
use std::io::Read;
use std::sync::Arc;

use crate::field::FieldInfo;
use crate::reader::MultipartReader;

/// The phase a [`MultipartReader`] is in.
///
/// Sections only move forward: `Preamble`, then `Headers` and `Body` once per
/// part, then `Epilogue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Preamble,
    Headers,
    Body,
    Epilogue,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Preamble => "preamble",
            Section::Headers => "headers",
            Section::Body => "body",
            Section::Epilogue => "epilogue",
        };
        f.write_str(name)
    }
}

pub(crate) struct MultipartState<R> {
    pub(crate) reader: MultipartReader<R>,
    pub(crate) stage: StreamingStage,
    pub(crate) whole_stream_limit: u64,
    /// Headers parsed ahead of `next_field`, body not yet touched.
    pub(crate) peeked: Option<Arc<FieldInfo>>,
    pub(crate) next_field_idx: usize,
    pub(crate) curr_field_idx: Option<usize>,
    pub(crate) curr_field_name: Option<String>,
    pub(crate) curr_field_size_limit: u64,
    pub(crate) curr_field_size_counter: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    /// The preamble, a previous body or the next header block is ahead.
    FindingNextField,
    /// The body of the current field is being handed out.
    ReadingFieldData,
    /// The closing boundary was seen and the epilogue drained.
    Eof,
}

impl<R: Read> MultipartState<R> {
    pub(crate) fn check_stream_size(&self) -> crate::Result<()> {
        if self.reader.position() > self.whole_stream_limit {
            return Err(crate::Error::StreamSizeExceeded {
                limit: self.whole_stream_limit,
            });
        }

        Ok(())
    }

    /// Releases the current field; its body is either complete or about to
    /// be discarded.
    pub(crate) fn finish_field(&mut self) {
        self.stage = StreamingStage::FindingNextField;
        self.curr_field_idx = None;
    }
}
