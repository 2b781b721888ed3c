//! Ordered execution of bound transform stages.

use std::sync::Arc;
use std::time::{Duration, Instant};

use relaybyte_runtime::ScopeGuard;
use relaybyte_types::Record;

use crate::collector::DirtyRecordCollector;
use crate::error::Result;
use crate::statistics::communication::Communication;
use crate::statistics::report::keys;
use crate::transform::binding::StageBinding;

/// Running counters of one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub succeeded: u64,
    pub failed: u64,
    pub filtered: u64,
    /// Time spent inside stages, including the one that filtered or failed.
    pub used: Duration,
}

/// Runs each record through every stage in order.
pub struct TransformPipeline {
    stages: Vec<StageBinding>,
    collector: Arc<dyn DirtyRecordCollector>,
    stats: TransformStats,
}

impl TransformPipeline {
    #[must_use]
    pub fn new(stages: Vec<StageBinding>, collector: Arc<dyn DirtyRecordCollector>) -> Self {
        Self {
            stages,
            collector,
            stats: TransformStats::default(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(StageBinding::name).collect()
    }

    #[must_use]
    pub fn stats(&self) -> TransformStats {
        self.stats
    }

    /// Transform one record.
    ///
    /// Returns `Ok(None)` when a stage filtered the record or failed on it;
    /// a failing stage sends the untouched input record to the dirty-record
    /// collector.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`](crate::error::EngineError::Config)
    /// when a stage's column index is outside the record on first use.
    pub fn evaluate(&mut self, record: Record) -> Result<Option<Record>> {
        if self.stages.is_empty() {
            return Ok(Some(record));
        }

        let original = record.clone();
        let mut current = record;
        for stage in &mut self.stages {
            stage.check_column(&current)?;

            let started = Instant::now();
            let outcome = {
                let _guard = stage.scope().map(|scope| ScopeGuard::enter(Arc::clone(scope)));
                stage
                    .transformer()
                    .evaluate(current, stage.context(), stage.args())
            };
            self.stats.used += started.elapsed();

            match outcome {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    self.stats.filtered += 1;
                    return Ok(None);
                }
                Err(e) => {
                    self.stats.failed += 1;
                    tracing::debug!(stage = stage.name(), error = %e, "Transform stage failed");
                    let message = format!("transformer({}) has Exception({e:#})", stage.name());
                    self.collector.collect_dirty_error(&original, &e, &message);
                    return Ok(None);
                }
            }
        }

        self.stats.succeeded += 1;
        Ok(Some(current))
    }

    /// Copy the counters into `communication`.
    pub fn publish_stats(&self, communication: &Communication) {
        let stats = self.stats;
        let to_i64 = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        let used = i64::try_from(stats.used.as_nanos()).unwrap_or(i64::MAX);
        communication.set_long_counter(keys::TRANSFORMER_SUCCESS_RECORDS, to_i64(stats.succeeded));
        communication.set_long_counter(keys::TRANSFORMER_FAILED_RECORDS, to_i64(stats.failed));
        communication.set_long_counter(keys::TRANSFORMER_FILTER_RECORDS, to_i64(stats.filtered));
        communication.set_long_counter(keys::TRANSFORMER_USED_TIME, used);
    }
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline")
            .field("stages", &self.stage_names())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::LoggingCollector;
    use crate::transform::builtin::{FilterTransformer, PadTransformer};
    use crate::transform::{StageArgs, StageContext, Transformer};
    use relaybyte_types::{Column, PluginKind};

    struct Failing;

    impl Transformer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn evaluate(
            &self,
            _record: Record,
            _context: &StageContext,
            _args: &StageArgs,
        ) -> anyhow::Result<Option<Record>> {
            anyhow::bail!("boom")
        }
    }

    fn pad_stage() -> StageBinding {
        StageBinding::new(
            "dx_pad",
            Arc::new(PadTransformer),
            StageArgs::new(Some(0), vec!["l".into(), "4".into(), "0".into()]),
        )
    }

    fn pipeline(
        stages: Vec<StageBinding>,
    ) -> (TransformPipeline, Arc<LoggingCollector>, Arc<Communication>) {
        let comm = Arc::new(Communication::new());
        let collector = Arc::new(LoggingCollector::new(PluginKind::Reader, Arc::clone(&comm)));
        (TransformPipeline::new(stages, collector.clone()), collector, comm)
    }

    fn record(text: &str) -> Record {
        Record::from_columns(vec![Column::from(text)])
    }

    #[test]
    fn empty_pipeline_passes_through_uncounted() {
        let (mut p, _, _) = pipeline(Vec::new());
        let out = p.evaluate(record("a")).unwrap().unwrap();
        assert_eq!(out.column(0), Some(&Column::from("a")));
        assert_eq!(p.stats(), TransformStats::default());
    }

    #[test]
    fn stages_run_in_order() {
        let filter = StageBinding::new(
            "dx_filter",
            Arc::new(FilterTransformer::default()),
            StageArgs::new(Some(0), vec!["=".into(), "0007".into()]),
        );
        let (mut p, _, _) = pipeline(vec![pad_stage(), filter]);
        let out = p.evaluate(record("7")).unwrap().unwrap();
        assert_eq!(out.column(0), Some(&Column::from("0007")));
        assert_eq!(p.stats().succeeded, 1);
        assert_eq!(p.stage_names(), vec!["dx_pad", "dx_filter"]);
    }

    #[test]
    fn failure_diverts_the_original_record() {
        let failing = StageBinding::new("failing", Arc::new(Failing), StageArgs::default());
        let (mut p, collector, comm) = pipeline(vec![pad_stage(), failing]);
        assert!(p.evaluate(record("7")).unwrap().is_none());

        let dirty = collector.drain();
        assert_eq!(dirty.len(), 1);
        assert_eq!(dirty[0].message, "transformer(failing) has Exception(boom)");
        assert_eq!(dirty[0].record, vec![Column::from("7")]);

        p.publish_stats(&comm);
        assert_eq!(comm.long_counter(keys::TRANSFORMER_FAILED_RECORDS), 1);
        assert_eq!(comm.long_counter(keys::TRANSFORMER_SUCCESS_RECORDS), 0);
        assert_eq!(comm.long_counter(keys::READ_FAILED_RECORDS), 1);
    }

    #[test]
    fn column_out_of_bounds_is_fatal() {
        let stage = StageBinding::new(
            "dx_pad",
            Arc::new(PadTransformer),
            StageArgs::new(Some(3), vec!["l".into(), "4".into(), "0".into()]),
        );
        let (mut p, _, _) = pipeline(vec![stage]);
        let err = p.evaluate(record("7")).unwrap_err();
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "configuration error: column index[3] out of bound[1]. name=dx_pad"
        );
    }

    #[test]
    fn publish_copies_every_counter() {
        let filter = StageBinding::new(
            "dx_filter",
            Arc::new(FilterTransformer::default()),
            StageArgs::new(Some(0), vec![">".into(), "10".into()]),
        );
        let (mut p, _, comm) = pipeline(vec![filter]);
        for text in ["5", "15", "abc"] {
            p.evaluate(record(text)).unwrap();
        }
        p.publish_stats(&comm);
        assert_eq!(comm.long_counter(keys::TRANSFORMER_SUCCESS_RECORDS), 1);
        assert_eq!(comm.long_counter(keys::TRANSFORMER_FILTER_RECORDS), 1);
        assert_eq!(comm.long_counter(keys::TRANSFORMER_FAILED_RECORDS), 1);
        assert!(comm.long_counter(keys::TRANSFORMER_USED_TIME) > 0);
    }
}
