use crate::bgzf::{self, RawBlock};
use crate::error::{Error, Result};
use crate::reorder::ReorderBuffer;
use crate::Block;

use flume::{Receiver, Sender};
use log::debug;
use rayon::spawn;
use std::io::Read;

// `None` marks the end of the stream.
type Status = Result<Option<Block>>;

/// Prefetches and decompresses BGZF members ahead of the consumer.
///
/// A reading task pulls raw members off the stream and hands each one, tagged
/// with its position, to an inflating task; an ordering task puts the inflated
/// blocks back into stream order. The number of blocks in flight is bounded by
/// the empty blocks circulating between the consumer and the reading task.
pub(crate) struct Readahead {
    used_block_sender: Sender<Block>,
    ready_rx: Receiver<Status>,
    finished: bool,
    // Keeps the workers alive while blocks are still coming.
    _pool: rayon::ThreadPool,
}

impl Readahead {
    pub fn new(thread_num: usize, mut reader: Box<dyn Read + Send + 'static>) -> Result<Self> {
        let thread_num = thread_num.clamp(1, num_cpus::get().max(1));
        let (raw_bufs_send, raw_bufs_recv) = flume::unbounded::<RawBlock>();
        let (used_block_sender, used_block_receiver) = flume::unbounded::<Block>();
        let (completed_tx, completed_rx) = flume::unbounded::<(u64, Status)>();
        let (ready_tx, ready_rx) = flume::unbounded::<Status>();
        for _ in 0..thread_num * 2 {
            // Receivers are alive, so these can't fail.
            let _ = raw_bufs_send.send(RawBlock::default());
            let _ = used_block_sender.send(Block::default());
        }

        // The reading and ordering tasks each occupy a worker for the whole
        // stream, inflation runs on the rest.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(thread_num + 2)
            .build()
            .map_err(|e| Error::InvalidBam(format!("failed to start decompression pool: {}", e)))?;

        // Ordering task.
        pool.spawn(move || {
            let mut pending = ReorderBuffer::new();
            while let Ok((seq, status)) = completed_rx.recv() {
                pending.insert(seq, status);
                while let Some(status) = pending.try_pop_next() {
                    let last = !matches!(status, Ok(Some(_)));
                    if ready_tx.send(status).is_err() || last {
                        return;
                    }
                }
            }
        });

        // Reading task.
        pool.spawn(move || {
            let mut seq: u64 = 0;
            // The stream must end with the empty EOF member.
            let mut last_was_eof = false;
            while let Ok(mut block) = used_block_receiver.recv() {
                let Ok(mut raw) = raw_bufs_recv.recv() else {
                    return;
                };
                let status = loop {
                    match bgzf::read_block(&mut reader, &mut raw) {
                        Ok(true) if raw.is_eof() => last_was_eof = true,
                        Ok(true) => {
                            last_was_eof = false;
                            break None;
                        }
                        Ok(false) if last_was_eof => break Some(Ok(None)),
                        Ok(false) => {
                            break Some(Err(Error::InvalidBam(
                                "missing BGZF EOF marker, the file is truncated".to_string(),
                            )))
                        }
                        Err(e) => break Some(Err(e)),
                    }
                };

                if let Some(status) = status {
                    debug!("readahead stopped after {} blocks", seq);
                    let _ = completed_tx.send((seq, status));
                    return;
                }

                let completed_tx = completed_tx.clone();
                let raw_bufs_send = raw_bufs_send.clone();
                let cur_seq = seq;
                spawn(move || {
                    let status = decompress_block(&raw, &mut block).map(|_| Some(block));
                    // The ordering task may already be gone if the consumer
                    // stopped early.
                    let _ = completed_tx.send((cur_seq, status));
                    let _ = raw_bufs_send.send(raw);
                });
                seq += 1;
            }
        });

        Ok(Self { used_block_sender, ready_rx, finished: false, _pool: pool })
    }

    /// Returns the next block in stream order, handing `old_buf` back for
    /// reuse. Blocks until the block is inflated; `Ok(None)` at end of stream.
    pub fn get_block(&mut self, old_buf: Block) -> Result<Option<Block>> {
        if self.finished {
            return Ok(None);
        }
        // The reading task may have stopped already; the buffer is then
        // simply dropped.
        let _ = self.used_block_sender.send(old_buf);
        let status = self.ready_rx.recv().unwrap_or_else(|_| {
            Err(Error::InvalidBam("decompression workers stopped unexpectedly".to_string()))
        });
        if !matches!(status, Ok(Some(_))) {
            self.finished = true;
        }
        status
    }
}

fn decompress_block(raw: &RawBlock, block: &mut Block) -> Result<()> {
    let udata = block.data_mut();
    bgzf::inflate(raw, udata.get_mut())?;
    udata.set_position(0);
    block.compressed_size = raw.compressed_size;
    Ok(())
}
