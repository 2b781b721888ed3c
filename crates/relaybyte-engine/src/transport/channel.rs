//! Bounded record channel between a source task and a sink task.
//!
//! The channel enforces a record-count ceiling and a byte ceiling at the
//! same time. Byte accounting uses each record's estimated in-memory size;
//! statistics use the payload size. An empty channel always accepts one
//! push so an oversize batch cannot wedge the pair.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use relaybyte_types::{Frame, Record};

use crate::config::ChannelConfig;
use crate::error::{EngineError, Result};
use crate::statistics::communication::Communication;
use crate::statistics::report::keys;
use crate::transport::governor::FlowGovernor;

struct Queue {
    frames: VecDeque<Frame>,
    bytes: usize,
    closed: bool,
}

/// Bounded, blocking, two-ceiling record queue.
pub struct Channel {
    capacity: usize,
    byte_capacity: usize,
    wait_timeout: Option<Duration>,
    queue: Mutex<Queue>,
    not_full: Condvar,
    not_empty: Condvar,
    communication: Arc<Communication>,
    governor: Option<Mutex<FlowGovernor>>,
    wait_writer_nanos: AtomicU64,
    wait_reader_nanos: AtomicU64,
}

impl Channel {
    /// Build a channel reporting into `communication`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] if either ceiling is zero.
    pub fn new(config: &ChannelConfig, communication: Arc<Communication>) -> Result<Self> {
        if config.capacity == 0 {
            return Err(EngineError::config("channel capacity must be > 0"));
        }
        let byte_capacity = config.byte_capacity.as_usize();
        if byte_capacity == 0 {
            return Err(EngineError::config("channel byte capacity must be > 0"));
        }
        let governor = FlowGovernor::new(
            config.byte_speed.map(|b| b.bytes()),
            config.record_speed,
            config.flow_control_interval(),
            Instant::now(),
        );
        if governor.is_some() {
            tracing::debug!(
                byte_speed = ?config.byte_speed.map(|b| b.bytes()),
                record_speed = ?config.record_speed,
                interval_ms = config.flow_control_interval_ms,
                "Channel throughput governor enabled"
            );
        }
        Ok(Self {
            capacity: config.capacity,
            byte_capacity,
            wait_timeout: config.wait_timeout(),
            queue: Mutex::new(Queue {
                frames: VecDeque::with_capacity(config.capacity.min(4096)),
                bytes: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            communication,
            governor: governor.map(Mutex::new),
            wait_writer_nanos: AtomicU64::new(0),
            wait_reader_nanos: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn byte_capacity(&self) -> usize {
        self.byte_capacity
    }

    #[must_use]
    pub fn communication(&self) -> &Arc<Communication> {
        &self.communication
    }

    /// Push one record, blocking while either ceiling is reached.
    ///
    /// # Errors
    ///
    /// [`EngineError::ChannelClosed`] on a closed channel, or
    /// [`EngineError::ChannelTimeout`] when space does not free up in time.
    pub fn push(&self, record: Record) -> Result<()> {
        let bytes = record.byte_size();
        self.push_frames(vec![Frame::Record(record)], 1, bytes)
    }

    /// Push a batch, blocking until it fits as a whole.
    ///
    /// # Errors
    ///
    /// See [`Channel::push`].
    pub fn push_all(&self, records: Vec<Record>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let count = records.len();
        let bytes = records.iter().map(Record::byte_size).sum();
        self.push_frames(records.into_iter().map(Frame::Record).collect(), count, bytes)
    }

    /// Push the end-of-stream sentinel. Records no statistics. A no-op on a
    /// closed channel.
    ///
    /// # Errors
    ///
    /// [`EngineError::ChannelTimeout`] when space does not free up in time.
    pub fn push_terminate(&self) -> Result<()> {
        let mut queue = self.queue.lock();
        if queue.closed {
            return Ok(());
        }
        let waited = self.wait_for_space(&mut queue, 1, 0)?;
        queue.frames.push_back(Frame::Terminate);
        self.not_empty.notify_all();
        drop(queue);
        add_wait(&self.wait_writer_nanos, waited);
        Ok(())
    }

    fn push_frames(&self, frames: Vec<Frame>, records: usize, bytes: usize) -> Result<()> {
        let memory: usize = frames.iter().map(Frame::memory_size).sum();
        let mut queue = self.queue.lock();
        let waited = self.wait_for_space(&mut queue, frames.len(), memory)?;
        queue.frames.extend(frames);
        queue.bytes += memory;
        self.not_empty.notify_all();
        drop(queue);

        add_wait(&self.wait_writer_nanos, waited);
        self.stat_push(records, bytes);
        Ok(())
    }

    /// Pull one frame, blocking while the channel is empty. A closed and
    /// drained channel yields [`Frame::Terminate`].
    ///
    /// # Errors
    ///
    /// [`EngineError::ChannelTimeout`] when nothing arrives in time.
    pub fn pull(&self) -> Result<Frame> {
        let mut queue = self.queue.lock();
        let waited = self.wait_for_data(&mut queue)?;
        let Some(frame) = queue.frames.pop_front() else {
            return Ok(Frame::Terminate);
        };
        queue.bytes = queue.bytes.saturating_sub(frame.memory_size());
        self.not_full.notify_all();
        drop(queue);

        add_wait(&self.wait_reader_nanos, waited);
        if !frame.is_terminate() {
            self.stat_pull(1, frame.byte_size());
        }
        Ok(frame)
    }

    /// Pull up to `max` frames into `out`, blocking while the channel is
    /// empty. A closed and drained channel yields a single
    /// [`Frame::Terminate`].
    ///
    /// # Errors
    ///
    /// [`EngineError::ChannelTimeout`] when nothing arrives in time.
    pub fn pull_all(&self, out: &mut Vec<Frame>, max: usize) -> Result<()> {
        let mut queue = self.queue.lock();
        let waited = self.wait_for_data(&mut queue)?;
        if queue.frames.is_empty() {
            out.push(Frame::Terminate);
            return Ok(());
        }
        let take = max.max(1).min(queue.frames.len());
        let start = out.len();
        let mut freed = 0;
        for frame in queue.frames.drain(..take) {
            freed += frame.memory_size();
            out.push(frame);
        }
        queue.bytes = queue.bytes.saturating_sub(freed);
        self.not_full.notify_all();
        drop(queue);

        add_wait(&self.wait_reader_nanos, waited);
        let pulled = &out[start..];
        let records = pulled.iter().filter(|f| !f.is_terminate()).count();
        let bytes = pulled.iter().map(Frame::byte_size).sum();
        if records > 0 {
            self.stat_pull(records, bytes);
        }
        Ok(())
    }

    /// Drop everything queued and wake blocked producers.
    pub fn clear(&self) {
        let mut queue = self.queue.lock();
        let dropped = queue.frames.len();
        queue.frames.clear();
        queue.bytes = 0;
        self.not_full.notify_all();
        drop(queue);
        if dropped > 0 {
            tracing::debug!(dropped, "Channel cleared");
        }
    }

    /// Refuse further pushes. Consumers drain what is queued and then see
    /// the end-of-stream sentinel.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        queue.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Number of queued frames, sentinel included.
    #[must_use]
    pub fn size(&self) -> usize {
        self.queue.lock().frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().frames.is_empty()
    }

    /// Estimated in-memory size of everything queued.
    #[must_use]
    pub fn memory_bytes(&self) -> usize {
        self.queue.lock().bytes
    }

    // ── Waiting ──────────────────────────────────────────────────────

    fn fits(&self, queue: &Queue, count: usize, memory: usize) -> bool {
        queue.frames.is_empty()
            || (queue.frames.len() + count <= self.capacity
                && queue.bytes + memory <= self.byte_capacity)
    }

    fn wait_for_space(
        &self,
        queue: &mut MutexGuard<'_, Queue>,
        count: usize,
        memory: usize,
    ) -> Result<Duration> {
        let started = Instant::now();
        let deadline = self.wait_timeout.map(|t| started + t);
        loop {
            if queue.closed {
                return Err(EngineError::ChannelClosed);
            }
            if self.fits(queue, count, memory) {
                return Ok(started.elapsed());
            }
            match deadline {
                Some(deadline) => {
                    if self.not_full.wait_until(queue, deadline).timed_out()
                        && !queue.closed
                        && !self.fits(queue, count, memory)
                    {
                        return Err(EngineError::ChannelTimeout {
                            op: "push",
                            waited: started.elapsed(),
                        });
                    }
                }
                None => self.not_full.wait(queue),
            }
        }
    }

    fn wait_for_data(&self, queue: &mut MutexGuard<'_, Queue>) -> Result<Duration> {
        let started = Instant::now();
        let deadline = self.wait_timeout.map(|t| started + t);
        loop {
            if !queue.frames.is_empty() || queue.closed {
                return Ok(started.elapsed());
            }
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(queue, deadline).timed_out()
                        && queue.frames.is_empty()
                        && !queue.closed
                    {
                        return Err(EngineError::ChannelTimeout {
                            op: "pull",
                            waited: started.elapsed(),
                        });
                    }
                }
                None => self.not_empty.wait(queue),
            }
        }
    }

    // ── Statistics ───────────────────────────────────────────────────

    fn stat_push(&self, records: usize, bytes: usize) {
        let comm = &self.communication;
        comm.increase_counter(keys::READ_SUCCEED_RECORDS, to_i64(records));
        comm.increase_counter(keys::READ_SUCCEED_BYTES, to_i64(bytes));
        comm.set_long_counter(keys::WAIT_WRITER_TIME, nanos_i64(&self.wait_writer_nanos));
        comm.set_long_counter(keys::WAIT_READER_TIME, nanos_i64(&self.wait_reader_nanos));

        let Some(governor) = &self.governor else {
            return;
        };
        let delay = governor
            .lock()
            .observe(Instant::now(), records as u64, bytes as u64);
        if !delay.is_zero() {
            tracing::trace!(
                sleep_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Throttling producer"
            );
            std::thread::sleep(delay);
        }
    }

    fn stat_pull(&self, records: usize, bytes: usize) {
        self.communication
            .increase_counter(keys::WRITE_RECEIVED_RECORDS, to_i64(records));
        self.communication
            .increase_counter(keys::WRITE_RECEIVED_BYTES, to_i64(bytes));
    }
}

fn add_wait(counter: &AtomicU64, waited: Duration) {
    let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
    if nanos > 0 {
        counter.fetch_add(nanos, Ordering::Relaxed);
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn nanos_i64(counter: &AtomicU64) -> i64 {
    i64::try_from(counter.load(Ordering::Relaxed)).unwrap_or(i64::MAX)
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("capacity", &self.capacity)
            .field("byte_capacity", &self.byte_capacity)
            .field("wait_timeout", &self.wait_timeout)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
