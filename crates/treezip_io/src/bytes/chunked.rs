use std::io::{Error, Write};

/// The buffering granularity recommended for file-backed sinks.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// An implementation of `Write` that buffers data in bounded chunks
/// before forwarding it to an external sink, and remembers how many
/// bytes went through.
pub struct ChunkedWriter<W>
where
    W: Write,
{
    sink: W,
    buffer: Vec<u8>,
    chunk_size: usize,
    bytes_written: usize,
}

impl<W> ChunkedWriter<W>
where
    W: Write,
{
    pub fn new(sink: W) -> Self {
        Self::with_chunk_size(sink, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(sink: W, chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        ChunkedWriter {
            sink,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
            bytes_written: 0,
        }
    }

    /// The number of bytes accepted so far, flushed or not.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    fn flush_buffer(&mut self) -> Result<(), Error> {
        if !self.buffer.is_empty() {
            self.sink.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush the remaining buffer and hand back the sink.
    pub fn done(mut self) -> Result<(W, usize), Error> {
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok((self.sink, self.bytes_written))
    }
}

impl<W> Write for ChunkedWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        self.buffer.extend_from_slice(buf);
        self.bytes_written += buf.len();
        if self.buffer.len() >= self.chunk_size {
            self.flush_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.flush_buffer()?;
        self.sink.flush()
    }
}

#[test]
fn test_chunked_writer() {
    let mut sink = vec![];
    {
        let mut writer = ChunkedWriter::with_chunk_size(&mut sink, 4);
        writer.write_all(&[1, 2]).unwrap();
        assert_eq!(writer.bytes_written(), 2);
        writer.write_all(&[3, 4, 5]).unwrap();
        writer.write_all(&[6]).unwrap();
        let (_, written) = writer.done().unwrap();
        assert_eq!(written, 6);
    }
    assert_eq!(sink, vec![1, 2, 3, 4, 5, 6]);
}
