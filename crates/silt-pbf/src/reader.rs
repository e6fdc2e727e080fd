//! The multi-threaded PBF reader.
//!
//! [`PbfReader::open`] parses the leading `OSMHeader` blob on the
//! calling thread, then hands the byte source to a framing thread
//! that splits the stream into data blobs and feeds a worker pool.
//! Workers decompress and decode blobs into buffers and push them
//! into the reorder queue tagged with their sequence number;
//! [`PbfReader::next_buffer`] releases them strictly in file order.
//!
//! Back-pressure: the framing thread pauses (10 ms sleeps) whenever
//! the pending-work queue or the reorder queue grows past its bound,
//! which keeps resident memory at `O(num_workers × max_blob_size)`
//! even with a slow consumer.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use silt_arena::Buffer;
use silt_core::ReadTypes;
use tracing::{debug, trace};

use crate::blob::{decode_blob_payload, read_blob};
use crate::decode::decode_primitive_block;
use crate::error::PbfError;
use crate::header::{decode_header_block, Header};
use crate::pool::WorkerPool;
use crate::sorted_queue::SortedQueue;
use crate::{BLOB_TYPE_DATA, BLOB_TYPE_HEADER};

/// Default number of decoder worker threads.
pub const DEFAULT_NUM_WORKERS: usize = 2;

/// Work-queue bound per worker; the framing thread sleeps when more
/// jobs than this are waiting.
const MAX_WORK_QUEUE_PER_WORKER: usize = 4;

/// Reorder-queue bound: base plus per-worker allowance.
const MAX_BUFFER_QUEUE_BASE: usize = 10;
const MAX_BUFFER_QUEUE_PER_WORKER: usize = 10;

/// How long the framing thread sleeps before re-checking a full queue.
const BACKPRESSURE_SLEEP: Duration = Duration::from_millis(10);

/// A decoded block traveling through the reorder queue. `Ok(None)`
/// marks the end of the stream; `Err` carries a worker or framing
/// failure to the consumer.
type BlockMessage = Result<Option<Buffer>, PbfError>;

/// Streaming reader for PBF files.
///
/// Buffers come back in the exact order their blobs appear in the
/// file, regardless of which worker finished first. After an error or
/// the end of the stream the reader stays finished; further calls
/// return `Ok(None)`.
pub struct PbfReader {
    header: Header,
    queue: Arc<SortedQueue<BlockMessage>>,
    done: Arc<AtomicBool>,
    framing: Option<JoinHandle<()>>,
    finished: bool,
}

impl PbfReader {
    /// Open a PBF stream with the default worker count, reading the
    /// header blob before returning.
    pub fn open<R: Read + Send + 'static>(
        source: R,
        read_types: ReadTypes,
    ) -> Result<Self, PbfError> {
        Self::with_workers(source, read_types, DEFAULT_NUM_WORKERS)
    }

    /// Open a PBF stream with an explicit worker count. Zero workers
    /// makes the framing thread decode blobs itself.
    pub fn with_workers<R: Read + Send + 'static>(
        mut source: R,
        read_types: ReadTypes,
        num_workers: usize,
    ) -> Result<Self, PbfError> {
        let blob = read_blob(&mut source)?
            .ok_or_else(|| PbfError::format("empty file: missing OSMHeader blob"))?;
        if blob.blob_type != BLOB_TYPE_HEADER {
            return Err(PbfError::format(format!(
                "first blob has type {:?}, expected {BLOB_TYPE_HEADER:?}",
                blob.blob_type
            )));
        }
        let content = decode_blob_payload(&blob.payload)?;
        let header = decode_header_block(&content)?;
        debug!(?read_types, num_workers, "opened PBF stream");

        let queue = Arc::new(SortedQueue::new());
        let done = Arc::new(AtomicBool::new(false));

        let mut finished = false;
        let framing = if read_types.is_nothing() {
            finished = true;
            None
        } else {
            let queue = Arc::clone(&queue);
            let done = Arc::clone(&done);
            Some(thread::spawn(move || {
                run_framing(source, read_types, num_workers, queue, done);
            }))
        };

        Ok(Self {
            header,
            queue,
            done,
            framing,
            finished,
        })
    }

    /// Meta information from the file header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Block until the next buffer in file order is ready.
    ///
    /// Returns `Ok(None)` at the end of the stream. An error from any
    /// pipeline stage surfaces here, on the call whose sequence
    /// position the failing blob holds, and finishes the stream.
    pub fn next_buffer(&mut self) -> Result<Option<Buffer>, PbfError> {
        if self.finished {
            return Ok(None);
        }
        match self.queue.wait_and_pop() {
            Ok(Some(buffer)) => Ok(Some(buffer)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                self.done.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Convert into an iterator over buffers.
    pub fn buffers(self) -> BufferIter {
        BufferIter { reader: self }
    }
}

impl Drop for PbfReader {
    fn drop(&mut self) {
        self.done.store(true, Ordering::Release);
        if let Some(framing) = self.framing.take() {
            let _ = framing.join();
        }
    }
}

/// Iterator adapter over the buffers of a [`PbfReader`].
pub struct BufferIter {
    reader: PbfReader,
}

impl Iterator for BufferIter {
    type Item = Result<Buffer, PbfError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_buffer() {
            Ok(Some(buffer)) => Some(Ok(buffer)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// The framing loop: split the stream into blobs, stamp sequence
/// numbers, and feed the pool. Runs on its own thread; the pool and
/// the source live and die with it.
fn run_framing<R: Read>(
    mut source: R,
    read_types: ReadTypes,
    num_workers: usize,
    queue: Arc<SortedQueue<BlockMessage>>,
    done: Arc<AtomicBool>,
) {
    let pool = WorkerPool::new(num_workers);
    let max_work_queue = MAX_WORK_QUEUE_PER_WORKER * num_workers;
    let max_buffer_queue = MAX_BUFFER_QUEUE_BASE + MAX_BUFFER_QUEUE_PER_WORKER * num_workers;

    let mut n: u64 = 0;
    loop {
        if done.load(Ordering::Acquire) {
            return;
        }
        match read_blob(&mut source) {
            Ok(Some(blob)) => {
                if blob.blob_type != BLOB_TYPE_DATA {
                    queue.push(
                        Err(PbfError::format(format!(
                            "blob {n} has type {:?}, expected {BLOB_TYPE_DATA:?}",
                            blob.blob_type
                        ))),
                        n,
                    );
                    return;
                }
                trace!(seq = n, bytes = blob.payload.len(), "dispatching data blob");
                let queue = Arc::clone(&queue);
                let seq = n;
                pool.submit(move || {
                    let result = decode_blob_payload(&blob.payload)
                        .and_then(|content| decode_primitive_block(&content, read_types));
                    queue.push(result.map(Some), seq);
                });
                n += 1;
            }
            Ok(None) => break,
            Err(e) => {
                queue.push(Err(e), n);
                return;
            }
        }

        // Pause reading while the decode backlog is too deep.
        while num_workers > 0
            && !done.load(Ordering::Acquire)
            && pool.queue_len() >= max_work_queue
        {
            thread::sleep(BACKPRESSURE_SLEEP);
        }
        // Pause reading while the consumer lags behind the workers.
        while !done.load(Ordering::Acquire) && queue.size() > max_buffer_queue {
            thread::sleep(BACKPRESSURE_SLEEP);
        }
    }

    trace!(blobs = n, "end of stream, draining workers");
    // Dropping the pool drains the backlog and joins the workers, so
    // every result is in the queue before the end marker goes in.
    drop(pool);
    queue.push(Ok(None), n);
    done.store(true, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use silt_arena::Item;
    use silt_test_utils::{header_block, primitive_block, wire, FileBuilder};

    fn dense_block(ids: &[i64]) -> Vec<u8> {
        let mut dense = Vec::new();
        wire::packed_sint_field(&mut dense, 1, ids);
        wire::packed_sint_field(&mut dense, 8, &vec![0; ids.len()]);
        wire::packed_sint_field(&mut dense, 9, &vec![0; ids.len()]);
        let mut group = Vec::new();
        wire::bytes_field(&mut group, 2, &dense);
        primitive_block(&[""], &[group])
    }

    fn plain_header() -> Vec<u8> {
        header_block(&["OsmSchema-V0.6", "DenseNodes"], Some("test"))
    }

    #[test]
    fn reads_header_then_buffers_in_order() {
        let stream = FileBuilder::new()
            .header_block(&plain_header())
            .data_block(&dense_block(&[1]))
            .data_block_zlib(&dense_block(&[2]))
            .data_block(&dense_block(&[3]))
            .build();

        let mut reader =
            PbfReader::with_workers(std::io::Cursor::new(stream), ReadTypes::ALL, 2).unwrap();
        assert_eq!(reader.header().generator.as_deref(), Some("test"));
        assert!(reader.header().pbf_has_dense_nodes);

        let mut ids = Vec::new();
        while let Some(buffer) = reader.next_buffer().unwrap() {
            for item in buffer.items() {
                let Item::Node(node) = item else {
                    panic!("expected node");
                };
                ids.push(node.id());
            }
        }
        assert_eq!(ids, vec![1, 2, 3]);
        // The reader stays finished.
        assert!(reader.next_buffer().unwrap().is_none());
    }

    #[test]
    fn synchronous_mode_produces_identical_output() {
        let stream = FileBuilder::new()
            .header_block(&plain_header())
            .data_block(&dense_block(&[10, 1]))
            .data_block(&dense_block(&[20]))
            .build();

        let collect = |workers: usize| {
            let reader = PbfReader::with_workers(
                std::io::Cursor::new(stream.clone()),
                ReadTypes::ALL,
                workers,
            )
            .unwrap();
            reader
                .buffers()
                .map(|buffer| buffer.unwrap().bytes().to_vec())
                .collect::<Vec<_>>()
        };

        assert_eq!(collect(0), collect(2));
    }

    #[test]
    fn empty_source_is_a_format_error() {
        let result = PbfReader::open(std::io::Cursor::new(Vec::new()), ReadTypes::ALL);
        assert!(matches!(result, Err(PbfError::Format { .. })));
    }

    #[test]
    fn header_only_file_yields_no_buffers() {
        let stream = FileBuilder::new().header_block(&plain_header()).build();
        let mut reader = PbfReader::open(std::io::Cursor::new(stream), ReadTypes::ALL).unwrap();
        assert!(reader.next_buffer().unwrap().is_none());
    }

    #[test]
    fn wrong_first_blob_type_is_a_format_error() {
        let stream = FileBuilder::new()
            .frame_with_type("OSMData", &dense_block(&[1]))
            .build();
        let result = PbfReader::open(std::io::Cursor::new(stream), ReadTypes::ALL);
        assert!(matches!(result, Err(PbfError::Format { .. })));
    }

    #[test]
    fn unknown_blob_type_surfaces_at_its_position() {
        let stream = FileBuilder::new()
            .header_block(&plain_header())
            .data_block(&dense_block(&[1]))
            .frame_with_type("Unknown", &dense_block(&[2]))
            .build();

        let mut reader = PbfReader::open(std::io::Cursor::new(stream), ReadTypes::ALL).unwrap();
        // The first blob decodes normally.
        let buffer = reader.next_buffer().unwrap().unwrap();
        assert_eq!(buffer.items().count(), 1);
        // The second surfaces the format error.
        assert!(matches!(
            reader.next_buffer(),
            Err(PbfError::Format { .. })
        ));
        // And the stream is finished afterwards.
        assert!(reader.next_buffer().unwrap().is_none());
    }

    #[test]
    fn lzma_blob_reports_unsupported() {
        let stream = FileBuilder::new()
            .header_block(&plain_header())
            .data_block_lzma()
            .build();
        let mut reader = PbfReader::open(std::io::Cursor::new(stream), ReadTypes::ALL).unwrap();
        assert!(matches!(
            reader.next_buffer(),
            Err(PbfError::Unsupported { .. })
        ));
    }

    #[test]
    fn read_types_nothing_skips_data_entirely() {
        let stream = FileBuilder::new()
            .header_block(&plain_header())
            .data_block(&dense_block(&[1]))
            .build();
        let mut reader =
            PbfReader::open(std::io::Cursor::new(stream), ReadTypes::NOTHING).unwrap();
        assert!(reader.next_buffer().unwrap().is_none());
    }

    #[test]
    fn dropping_mid_stream_shuts_down_cleanly() {
        let mut builder = FileBuilder::new().header_block(&plain_header());
        for i in 0..50 {
            builder = builder.data_block(&dense_block(&[i]));
        }
        let stream = builder.build();

        let mut reader =
            PbfReader::with_workers(std::io::Cursor::new(stream), ReadTypes::ALL, 2).unwrap();
        let first = reader.next_buffer().unwrap().unwrap();
        assert_eq!(first.items().count(), 1);
        drop(reader);
    }
}
