//! The multi-threaded PBF writer.
//!
//! [`PbfWriter::create`] writes the `OSMHeader` frame and spawns a
//! dedicated I/O thread. Buffers submitted by the caller are encoded
//! and compressed on a worker pool; finished frames travel through a
//! sorted reorder queue so the I/O thread writes them in submission
//! order, overlapping encoding with output. Single items are batched
//! into an internal buffer that flushes when full.
//!
//! A writer is `okay` until either `close()` succeeds (`closed`) or
//! any stage fails (`error`); once failed, every further write is
//! rejected with [`PbfError::AlreadyFailed`]. Dropping the writer
//! closes it defensively, discarding errors — only `close()` reports
//! them.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use silt_arena::{Buffer, GrowPolicy, Item};
use tracing::trace;

use crate::blob::{encode_blob_frame, Compression};
use crate::encode::encode_data_blob;
use crate::error::PbfError;
use crate::header::{encode_header_block, Header};
use crate::pool::WorkerPool;
use crate::sorted_queue::SortedQueue;
use crate::BLOB_TYPE_HEADER;

/// Default size of the internal buffer single items are batched into.
pub const DEFAULT_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Default number of encoder worker threads.
pub const DEFAULT_ENCODE_WORKERS: usize = 2;

/// Bound on frames buffered ahead of the I/O thread; the caller
/// pauses when the reorder queue grows past this.
const OUTPUT_QUEUE_DEPTH: usize = 20;

/// How long the caller sleeps before re-checking a full output queue.
const BACKPRESSURE_SLEEP: Duration = Duration::from_millis(10);

/// An encoded frame traveling to the I/O thread. `Ok(None)` signals
/// end of data.
type FrameMessage = Result<Option<Vec<u8>>, PbfError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Status {
    Okay,
    Error,
    Closed,
}

/// Streaming writer for PBF files.
pub struct PbfWriter {
    pool: WorkerPool,
    queue: Arc<SortedQueue<FrameMessage>>,
    io_thread: Option<JoinHandle<()>>,
    io_error: Arc<Mutex<Option<PbfError>>>,
    buffer: Option<Buffer>,
    buffer_size: usize,
    next_seq: u64,
    status: Status,
    compression: Compression,
}

impl PbfWriter {
    /// Create a writer over `sink` with zlib compression and the
    /// default worker count. The header frame is encoded immediately.
    pub fn create<W: Write + Send + 'static>(sink: W, header: &Header) -> Result<Self, PbfError> {
        Self::with_options(sink, header, Compression::default(), DEFAULT_ENCODE_WORKERS)
    }

    /// Create a writer with explicit compression and worker count.
    /// Zero workers encodes on the calling thread.
    pub fn with_options<W: Write + Send + 'static>(
        sink: W,
        header: &Header,
        compression: Compression,
        num_workers: usize,
    ) -> Result<Self, PbfError> {
        let header_frame =
            encode_blob_frame(BLOB_TYPE_HEADER, &encode_header_block(header), compression)?;

        let queue = Arc::new(SortedQueue::new());
        let io_error = Arc::new(Mutex::new(None));
        let io_thread = {
            let queue = Arc::clone(&queue);
            let io_error = Arc::clone(&io_error);
            thread::spawn(move || run_io_thread(sink, queue, io_error))
        };
        queue.push(Ok(Some(header_frame)), 0);

        Ok(Self {
            pool: WorkerPool::new(num_workers),
            queue,
            io_thread: Some(io_thread),
            io_error,
            buffer: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            next_seq: 1,
            status: Status::Okay,
            compression,
        })
    }

    /// Size used for the internal item-batching buffer. Takes effect
    /// when the next internal buffer is allocated.
    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    /// Submit a whole buffer for encoding. Items batched earlier via
    /// [`write_item`](Self::write_item) are flushed first so output
    /// order matches submission order.
    pub fn write_buffer(&mut self, buffer: Buffer) -> Result<(), PbfError> {
        self.flush()?;
        self.submit_buffer(buffer)
    }

    /// Append one item to the internal buffer, flushing it when full.
    pub fn write_item(&mut self, item: &Item<'_>) -> Result<(), PbfError> {
        self.check_status()?;
        let size = self.buffer_size;
        let buffer = self
            .buffer
            .get_or_insert_with(|| Buffer::new(size, GrowPolicy::Fixed));
        match buffer.push(item) {
            Ok(()) => Ok(()),
            Err(silt_arena::ArenaError::BufferFull { .. }) => {
                self.flush()?;
                let buffer = self
                    .buffer
                    .get_or_insert_with(|| Buffer::new(size, GrowPolicy::Fixed));
                buffer.push(item).map_err(PbfError::from)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Encode and enqueue the internal buffer, if it holds anything.
    pub fn flush(&mut self) -> Result<(), PbfError> {
        if let Some(buffer) = self.buffer.take() {
            if !buffer.is_empty() {
                self.submit_buffer(buffer)?;
            }
        }
        Ok(())
    }

    /// Flush, signal end of data, and join the I/O thread. Reports
    /// any error captured by the pipeline; only a writer whose
    /// `close()` returned `Ok` is known to have written everything.
    pub fn close(&mut self) -> Result<(), PbfError> {
        if self.status == Status::Closed {
            return Ok(());
        }
        let flushed = if self.status == Status::Okay {
            self.flush()
        } else {
            Ok(())
        };

        self.queue.push(Ok(None), self.next_seq);
        self.next_seq += 1;
        if let Some(handle) = self.io_thread.take() {
            let _ = handle.join();
        }

        let io_error = self.io_error.lock().unwrap().take();
        let had_failed = self.status == Status::Error;
        self.status = Status::Closed;

        flushed?;
        if let Some(e) = io_error {
            return Err(e);
        }
        if had_failed {
            return Err(PbfError::AlreadyFailed);
        }
        Ok(())
    }

    fn submit_buffer(&mut self, buffer: Buffer) -> Result<(), PbfError> {
        self.check_status()?;
        if buffer.is_empty() {
            return Ok(());
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        trace!(seq, committed = buffer.committed(), "dispatching buffer for encoding");

        let queue = Arc::clone(&self.queue);
        let compression = self.compression;
        self.pool.submit(move || {
            let result = encode_data_blob(&buffer, compression);
            queue.push(result.map(Some), seq);
        });

        // Pause while the I/O thread is behind.
        while self.queue.size() > OUTPUT_QUEUE_DEPTH {
            thread::sleep(BACKPRESSURE_SLEEP);
        }
        Ok(())
    }

    fn check_status(&mut self) -> Result<(), PbfError> {
        match self.status {
            Status::Okay => {
                if let Some(e) = self.io_error.lock().unwrap().take() {
                    self.status = Status::Error;
                    return Err(e);
                }
                Ok(())
            }
            Status::Error | Status::Closed => Err(PbfError::AlreadyFailed),
        }
    }
}

impl Drop for PbfWriter {
    fn drop(&mut self) {
        if self.io_thread.is_some() {
            // The destructor must not fail; only close() reports.
            let _ = self.close();
        }
    }
}

/// The I/O loop: pop frames in order and write them out. After the
/// first failure it keeps draining (so producers and `close()` never
/// stall) but writes nothing further.
fn run_io_thread<W: Write>(
    mut sink: W,
    queue: Arc<SortedQueue<FrameMessage>>,
    io_error: Arc<Mutex<Option<PbfError>>>,
) {
    let record = |e: PbfError| {
        let mut slot = io_error.lock().unwrap();
        if slot.is_none() {
            *slot = Some(e);
        }
    };

    let mut failed = false;
    loop {
        match queue.wait_and_pop() {
            Ok(Some(frame)) => {
                if !failed {
                    if let Err(e) = sink.write_all(&frame) {
                        record(e.into());
                        failed = true;
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                record(e);
                failed = true;
            }
        }
    }
    if !failed {
        if let Err(e) = sink.flush() {
            record(e.into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::PbfReader;
    use silt_arena::{ChangesetBuilder, NodeBuilder};
    use silt_core::{Location, ReadTypes};
    use std::io;

    /// A sink the test keeps access to after the writer takes it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A sink that fails every write.
    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn node_buffer(ids: &[i64]) -> Buffer {
        let mut buffer = Buffer::new(1 << 16, GrowPolicy::Fixed);
        for &id in ids {
            let mut builder = NodeBuilder::new(&mut buffer).unwrap();
            builder.set_id(id).set_location(Location::new(1, 2));
            builder.add_user("").unwrap();
            builder.finish().unwrap();
        }
        buffer
    }

    fn read_ids(bytes: Vec<u8>) -> Vec<i64> {
        let reader = PbfReader::open(io::Cursor::new(bytes), ReadTypes::ALL).unwrap();
        reader
            .buffers()
            .flat_map(|buffer| {
                buffer
                    .unwrap()
                    .items()
                    .map(|item| match item {
                        Item::Node(node) => node.id(),
                        other => panic!("expected node, got {:?}", other.kind()),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[test]
    fn buffers_are_written_in_submission_order() {
        let sink = SharedSink::default();
        let mut writer = PbfWriter::create(sink.clone(), &Header::default()).unwrap();
        for ids in [&[1i64, 2][..], &[3], &[4, 5, 6]] {
            writer.write_buffer(node_buffer(ids)).unwrap();
        }
        writer.close().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        assert_eq!(read_ids(bytes), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn uncompressed_output_reads_back() {
        let sink = SharedSink::default();
        let mut writer =
            PbfWriter::with_options(sink.clone(), &Header::default(), Compression::None, 0)
                .unwrap();
        writer.write_buffer(node_buffer(&[7])).unwrap();
        writer.close().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        assert_eq!(read_ids(bytes), vec![7]);
    }

    #[test]
    fn items_batch_and_flush_on_overflow() {
        let sink = SharedSink::default();
        let mut writer = PbfWriter::create(sink.clone(), &Header::default()).unwrap();
        // A buffer this small holds only a couple of nodes, so the
        // writer must rotate internal buffers several times.
        writer.set_buffer_size(256);

        let source = node_buffer(&[1, 2, 3, 4, 5, 6, 7, 8]);
        for item in source.items() {
            writer.write_item(&item).unwrap();
        }
        writer.close().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        assert_eq!(read_ids(bytes), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn close_is_idempotent_and_writes_reject_afterwards() {
        let sink = SharedSink::default();
        let mut writer = PbfWriter::create(sink.clone(), &Header::default()).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.write_buffer(node_buffer(&[1])),
            Err(PbfError::AlreadyFailed)
        ));
    }

    #[test]
    fn sink_failure_surfaces_on_close() {
        let mut writer = PbfWriter::create(BrokenSink, &Header::default()).unwrap();
        // The write may or may not observe the failure depending on
        // timing, but close() must.
        let write_result = writer.write_buffer(node_buffer(&[1]));
        let close_result = writer.close();
        assert!(write_result.is_err() || close_result.is_err());
        // Afterwards the writer rejects everything.
        assert!(matches!(
            writer.write_buffer(node_buffer(&[2])),
            Err(PbfError::AlreadyFailed)
        ));
    }

    #[test]
    fn encode_failure_surfaces_and_poisons_the_writer() {
        let sink = SharedSink::default();
        let mut writer = PbfWriter::create(sink, &Header::default()).unwrap();

        let mut buffer = Buffer::new(1 << 12, GrowPolicy::Fixed);
        let mut builder = ChangesetBuilder::new(&mut buffer).unwrap();
        builder.set_id(1);
        builder.add_user("").unwrap();
        builder.finish().unwrap();

        // The changeset cannot be encoded; the error is captured by
        // the pipeline and reported by close().
        writer.write_buffer(buffer).unwrap();
        assert!(writer.close().is_err());
    }

    #[test]
    fn header_frame_written_even_without_data() {
        let sink = SharedSink::default();
        let header = Header {
            generator: Some("silt-writer-test".to_owned()),
            has_multiple_object_versions: true,
            ..Header::default()
        };
        let mut writer = PbfWriter::create(sink.clone(), &header).unwrap();
        writer.close().unwrap();

        let bytes = sink.0.lock().unwrap().clone();
        let reader = PbfReader::open(io::Cursor::new(bytes), ReadTypes::ALL).unwrap();
        assert_eq!(reader.header().generator.as_deref(), Some("silt-writer-test"));
        assert!(reader.header().has_multiple_object_versions);
    }

    #[test]
    fn drop_without_close_still_produces_a_readable_file() {
        let sink = SharedSink::default();
        {
            let mut writer = PbfWriter::create(sink.clone(), &Header::default()).unwrap();
            writer.write_buffer(node_buffer(&[9])).unwrap();
            // Dropped without close().
        }
        let bytes = sink.0.lock().unwrap().clone();
        assert_eq!(read_ids(bytes), vec![9]);
    }
}
