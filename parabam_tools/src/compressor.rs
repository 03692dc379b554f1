use bam_codec::bam::codec::encode_record;
use bam_codec::bgzf;
use bam_codec::reorder::ReorderBuffer;
use bam_codec::{Error, Header, Record, Result};
use flate2::Compression;
use flume::{Receiver, Sender};
use log::{debug, error};
use rayon::ThreadPool;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A batch of records waiting to be encoded, numbered in dispatch order.
pub(crate) struct CompressTask {
    pub seq: u64,
    pub records: Vec<Record>,
}

// BGZF bytes of one block, or the reason it could not be produced.
type CompressedChunk = (u64, Result<Vec<u8>>);

/// Serializes `records` with `header` and compresses them into BGZF members
/// appended to `out`. `raw` is scratch space.
pub(crate) fn encode_block(
    seq: u64,
    records: &[Record],
    header: &Header,
    level: Compression,
    raw: &mut Vec<u8>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let encoding_error = |reason: String| Error::Encoding { seq, reason };
    raw.clear();
    for record in records {
        encode_record(record, header, raw).map_err(|e| encoding_error(e.to_string()))?;
    }
    bgzf::compress(raw, level, out).map_err(|e| encoding_error(e.to_string()))
}

/// Parallel block compressor.
///
/// Blocks go through a bounded queue to `thread_num` workers; a single writer
/// thread puts the compressed chunks back in sequence order and writes them to
/// the sink. At most `4 * thread_num` blocks are in flight between dispatch
/// and the sink. A failed block stops the workers from picking up any later
/// block, and its error is reported when its turn to be written comes, so the
/// lowest failing block is the one named.
pub(crate) struct Compressor<W> {
    _compr_pool: ThreadPool,
    task_tx: Option<Sender<CompressTask>>,
    // One permit per block allowed in flight; the writer thread returns them.
    permit_rx: Receiver<()>,
    // Blocks numbered at or above this are dropped. `u64::MAX` while healthy.
    stop_at: Arc<AtomicU64>,
    writer_thread: Option<JoinHandle<Result<(W, u64)>>>,
    // Blocks handed to the workers.
    sent: u64,
}

impl<W> Compressor<W>
where
    W: Write + Send + 'static,
{
    pub fn new(inner: W, header: Arc<Header>, thread_num: usize, level: Compression) -> Result<Self> {
        let window = 4 * thread_num;
        let (task_tx, task_rx) = flume::bounded::<CompressTask>(2 * thread_num);
        let (chunk_tx, chunk_rx) = flume::bounded::<CompressedChunk>(window);
        let (permit_tx, permit_rx) = flume::bounded::<()>(window);
        for _ in 0..window {
            // The receiver is alive, so this can't fail.
            let _ = permit_tx.send(());
        }
        let stop_at = Arc::new(AtomicU64::new(u64::MAX));

        let compr_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_num)
            .thread_name(|i| format!("bgzf-worker-{}", i))
            .panic_handler(|_| error!("compression worker panicked"))
            .build()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        for _ in 0..thread_num {
            let task_rx = task_rx.clone();
            let chunk_tx = chunk_tx.clone();
            let header = header.clone();
            let stop_at = stop_at.clone();
            compr_pool.spawn(move || compress_blocks(task_rx, chunk_tx, &header, level, &stop_at));
        }
        // Only the workers may hold these, so their exit disconnects the channels.
        drop(task_rx);
        drop(chunk_tx);

        let writer_stop_at = stop_at.clone();
        let writer_thread = thread::Builder::new()
            .name("bam-writer".to_string())
            .spawn(move || write_in_order(inner, chunk_rx, permit_tx, &writer_stop_at))?;

        Ok(Compressor {
            _compr_pool: compr_pool,
            task_tx: Some(task_tx),
            permit_rx,
            stop_at,
            writer_thread: Some(writer_thread),
            sent: 0,
        })
    }

    /// Queues a block, blocking while the in-flight window is full.
    pub fn compress_block(&mut self, task: CompressTask) -> Result<()> {
        if self.stop_at.load(Ordering::Acquire) != u64::MAX || self.permit_rx.recv().is_err() {
            return Err(self.shutdown());
        }
        let seq = task.seq;
        let sent = match self.task_tx.as_ref() {
            Some(tx) => tx.send(task).is_ok(),
            None => false,
        };
        if !sent {
            return Err(self.shutdown());
        }
        debug!("dispatched block #{}", seq);
        self.sent += 1;
        Ok(())
    }

    /// Waits until every queued block is written and returns the sink.
    pub fn finish(mut self) -> Result<W> {
        self.task_tx.take();
        let (inner, written) = self.join()?;
        if written != self.sent {
            return Err(Error::Reorder { expected: written });
        }
        Ok(inner)
    }

    // Stops the pipeline after a failure and returns its cause.
    fn shutdown(&mut self) -> Error {
        self.task_tx.take();
        match self.join() {
            Err(e) => e,
            Ok((_, written)) => Error::Reorder { expected: written },
        }
    }

    fn join(&mut self) -> Result<(W, u64)> {
        let handle = self.writer_thread.take().ok_or_else(|| {
            Error::Io(io::Error::new(io::ErrorKind::Other, "writer thread already stopped"))
        })?;
        handle.join().unwrap_or_else(|_| {
            Err(Error::Io(io::Error::new(io::ErrorKind::Other, "writer thread panicked")))
        })
    }
}

// Dropped without `finish`: nothing more reaches the sink once this returns.
impl<W> Drop for Compressor<W> {
    fn drop(&mut self) {
        let handle = match self.writer_thread.take() {
            Some(handle) => handle,
            None => return,
        };
        self.stop_at.store(0, Ordering::Release);
        self.task_tx.take();
        if handle.join().is_err() {
            error!("writer thread panicked");
        }
    }
}

fn compress_blocks(
    task_rx: Receiver<CompressTask>,
    chunk_tx: Sender<CompressedChunk>,
    header: &Header,
    level: Compression,
    stop_at: &AtomicU64,
) {
    let mut raw = Vec::new();
    while let Ok(task) = task_rx.recv() {
        // Keep draining so a blocked dispatcher gets through.
        if task.seq >= stop_at.load(Ordering::Acquire) {
            continue;
        }
        let seq = task.seq;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut out = Vec::new();
            encode_block(seq, &task.records, header, level, &mut raw, &mut out).map(|_| out)
        }))
        .unwrap_or_else(|_| {
            Err(Error::Encoding { seq, reason: "compression worker panicked".to_string() })
        });
        if result.is_err() {
            stop_at.fetch_min(seq + 1, Ordering::AcqRel);
        }
        if chunk_tx.send((seq, result)).is_err() {
            return;
        }
    }
}

fn write_in_order<W: Write>(
    mut inner: W,
    chunk_rx: Receiver<CompressedChunk>,
    permit_tx: Sender<()>,
    stop_at: &AtomicU64,
) -> Result<(W, u64)> {
    let mut pending = ReorderBuffer::new();
    let result = (|| -> Result<()> {
        while let Ok((seq, chunk)) = chunk_rx.recv() {
            pending.insert(seq, chunk);
            while let Some(chunk) = pending.try_pop_next() {
                let seq = pending.next_seq() - 1;
                let data = chunk?;
                if seq >= stop_at.load(Ordering::Acquire) {
                    return Err(Error::Reorder { expected: seq });
                }
                inner.write_all(&data)?;
                debug!("wrote block #{}", seq);
                // The dispatcher may be gone already.
                let _ = permit_tx.send(());
            }
        }
        // All workers are gone; anything still buffered sits behind a block
        // that will never arrive.
        if !pending.is_empty() {
            return Err(Error::Reorder { expected: pending.next_seq() });
        }
        Ok(())
    })();

    match result {
        Ok(()) => Ok((inner, pending.next_seq())),
        Err(e) => {
            stop_at.store(0, Ordering::Release);
            Err(e)
        }
    }
}
