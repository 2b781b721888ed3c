use std::sync::Arc;

use relaybyte_types::Record;

use crate::error::{EngineError, Result};
use crate::transform::TransformPipeline;
use crate::transport::channel::Channel;
use crate::transport::exchanger::Exchanger;

/// Unbuffered exchanger that runs the transform pipeline on every send.
pub struct DirectExchanger {
    channel: Arc<Channel>,
    pipeline: TransformPipeline,
    record_columns: usize,
    terminated: bool,
    shut_down: bool,
}

impl DirectExchanger {
    #[must_use]
    pub fn new(channel: Arc<Channel>, pipeline: TransformPipeline, record_columns: usize) -> Self {
        Self {
            channel,
            pipeline,
            record_columns,
            terminated: false,
            shut_down: false,
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shut_down {
            return Err(EngineError::AlreadyShutDown);
        }
        Ok(())
    }

    fn publish(&self) {
        self.pipeline.publish_stats(self.channel.communication());
    }
}

impl Exchanger for DirectExchanger {
    fn create_record(&self) -> Result<Record> {
        self.ensure_open()?;
        Ok(Record::with_capacity(self.record_columns))
    }

    fn send_to_writer(&mut self, record: Record) -> Result<()> {
        self.ensure_open()?;
        let Some(record) = self.pipeline.evaluate(record)? else {
            return Ok(());
        };
        self.channel.push(record)?;
        self.publish();
        Ok(())
    }

    fn get_from_reader(&mut self) -> Result<Option<Record>> {
        self.ensure_open()?;
        if self.terminated {
            return Ok(None);
        }
        let record = self.channel.pull()?.into_record();
        self.terminated = record.is_none();
        Ok(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn terminate(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.channel.push_terminate()?;
        self.publish();
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.channel.clear();
        tracing::debug!("Direct exchanger shut down");
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl std::fmt::Debug for DirectExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectExchanger")
            .field("stages", &self.pipeline.len())
            .field("terminated", &self.terminated)
            .field("shut_down", &self.shut_down)
            .finish_non_exhaustive()
    }
}
