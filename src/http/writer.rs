use std::io::{self, IoSlice, Write};

use bytes::BytesMut;

use crate::files::FileMapping;

/// The pending response: a head segment and an optional file segment.
///
/// `sent` counts bytes already accepted by the socket across both segments,
/// so a transmission interrupted by a full socket resumes exactly where it
/// stopped.
pub struct Outgoing {
    head: BytesMut,
    body: Option<FileMapping>,
    sent: usize,
}

impl Outgoing {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            head: BytesMut::with_capacity(capacity),
            body: None,
            sent: 0,
        }
    }

    pub fn head(&self) -> &[u8] {
        &self.head
    }

    pub(crate) fn head_mut(&mut self) -> &mut BytesMut {
        &mut self.head
    }

    pub fn attach_file(&mut self, mapping: FileMapping) {
        self.body = Some(mapping);
    }

    pub fn has_file(&self) -> bool {
        self.body.is_some()
    }

    /// Number of scatter-gather segments: 1 for inline responses, 2 with a file.
    pub fn segment_count(&self) -> usize {
        if self.body.is_some() { 2 } else { 1 }
    }

    /// The segments in transmission order.
    pub fn segments(&self) -> impl Iterator<Item = &[u8]> {
        std::iter::once(&self.head[..]).chain(self.body.as_ref().map(FileMapping::as_slice))
    }

    pub fn total_len(&self) -> usize {
        self.head.len() + self.body.as_ref().map_or(0, FileMapping::len)
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn remaining(&self) -> usize {
        self.total_len() - self.sent
    }

    pub fn is_empty(&self) -> bool {
        self.total_len() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.total_len()
    }

    fn pending(&self) -> ([IoSlice<'_>; 2], usize) {
        let mut slices = [IoSlice::new(&[]), IoSlice::new(&[])];
        let mut count = 0;

        let head_len = self.head.len();
        if self.sent < head_len {
            slices[count] = IoSlice::new(&self.head[self.sent..]);
            count += 1;
        }
        if let Some(file) = &self.body {
            let offset = self.sent.saturating_sub(head_len);
            if offset < file.len() {
                slices[count] = IoSlice::new(&file.as_slice()[offset..]);
                count += 1;
            }
        }

        (slices, count)
    }

    /// Issues one vectored write of everything not yet sent.
    pub fn send_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<usize> {
        let (slices, count) = self.pending();
        let n = sink.write_vectored(&slices[..count])?;
        self.sent = (self.sent + n).min(self.total_len());
        Ok(n)
    }

    /// Drops the file mapping, if any.
    pub fn release_file(&mut self) {
        self.body = None;
    }

    pub fn clear(&mut self) {
        self.head.clear();
        self.body = None;
        self.sent = 0;
    }
}
