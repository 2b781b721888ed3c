use std::collections::VecDeque;
use std::sync::Arc;

use relaybyte_types::{Frame, Record};

use crate::collector::DirtyRecordCollector;
use crate::config::ExchangerConfig;
use crate::error::{EngineError, Result};
use crate::statistics::report::format_bytes;
use crate::transport::channel::Channel;
use crate::transport::exchanger::Exchanger;

/// Exchanger that batches sends and reads.
///
/// Sends accumulate until the buffer reaches `buffer_size` records or the
/// channel's byte capacity, then go to the channel in one push. Reads pull a
/// batch and serve it one record at a time.
pub struct BufferedExchanger {
    channel: Arc<Channel>,
    collector: Arc<dyn DirtyRecordCollector>,
    buffer_size: usize,
    byte_capacity: usize,
    record_columns: usize,
    send_buffer: Vec<Record>,
    send_bytes: usize,
    receive_buffer: VecDeque<Record>,
    pulled: Vec<Frame>,
    terminated: bool,
    shut_down: bool,
}

impl BufferedExchanger {
    #[must_use]
    pub fn new(
        channel: Arc<Channel>,
        collector: Arc<dyn DirtyRecordCollector>,
        config: &ExchangerConfig,
    ) -> Self {
        let buffer_size = config.buffer_size.max(1);
        let byte_capacity = channel.byte_capacity();
        Self {
            channel,
            collector,
            buffer_size,
            byte_capacity,
            record_columns: config.record_columns,
            send_buffer: Vec::with_capacity(buffer_size),
            send_bytes: 0,
            receive_buffer: VecDeque::with_capacity(buffer_size),
            pulled: Vec::with_capacity(buffer_size),
            terminated: false,
            shut_down: false,
        }
    }

    /// Records waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.send_buffer.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down {
            return Err(EngineError::AlreadyShutDown);
        }
        Ok(())
    }

    fn push_buffer(&mut self) -> Result<()> {
        if self.send_buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.send_buffer, Vec::with_capacity(self.buffer_size));
        self.send_bytes = 0;
        self.channel.push_all(batch)
    }

    fn refill(&mut self) -> Result<()> {
        self.pulled.clear();
        self.channel.pull_all(&mut self.pulled, self.buffer_size)?;
        for frame in self.pulled.drain(..) {
            match frame {
                Frame::Record(record) => self.receive_buffer.push_back(record),
                Frame::Terminate => {
                    self.terminated = true;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Exchanger for BufferedExchanger {
    fn create_record(&self) -> Result<Record> {
        self.ensure_open()?;
        Ok(Record::with_capacity(self.record_columns))
    }

    fn send_to_writer(&mut self, record: Record) -> Result<()> {
        self.ensure_open()?;
        let size = record.memory_size();
        if size > self.byte_capacity {
            self.collector.collect_dirty_record(
                &record,
                &format!(
                    "single record exceeds size limit, current limit: {}",
                    format_bytes(i64::try_from(self.byte_capacity).unwrap_or(i64::MAX))
                ),
            );
            return Ok(());
        }
        if self.send_buffer.len() >= self.buffer_size
            || self.send_bytes + size > self.byte_capacity
        {
            self.push_buffer()?;
        }
        self.send_bytes += size;
        self.send_buffer.push(record);
        Ok(())
    }

    fn get_from_reader(&mut self) -> Result<Option<Record>> {
        self.ensure_open()?;
        loop {
            if let Some(record) = self.receive_buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.terminated {
                return Ok(None);
            }
            self.refill()?;
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.push_buffer()
    }

    fn terminate(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.push_buffer()?;
        self.channel.push_terminate()
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.send_buffer.clear();
        self.send_bytes = 0;
        self.receive_buffer.clear();
        self.pulled.clear();
        self.channel.clear();
        tracing::debug!("Buffered exchanger shut down");
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl std::fmt::Debug for BufferedExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedExchanger")
            .field("buffer_size", &self.buffer_size)
            .field("byte_capacity", &self.byte_capacity)
            .field("buffered", &self.send_buffer.len())
            .field("terminated", &self.terminated)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}
