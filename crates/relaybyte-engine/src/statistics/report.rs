//! Report metrics derived from communication snapshots.

use crate::statistics::communication::Communication;

/// Well-known counter keys.
pub mod keys {
    pub const STAGE: &str = "stage";
    pub const BYTE_SPEED: &str = "byte_speed";
    pub const RECORD_SPEED: &str = "record_speed";
    pub const PERCENTAGE: &str = "percentage";

    pub const READ_SUCCEED_RECORDS: &str = "read_succeed_records";
    pub const READ_SUCCEED_BYTES: &str = "read_succeed_bytes";
    pub const READ_FAILED_RECORDS: &str = "read_failed_records";
    pub const READ_FAILED_BYTES: &str = "read_failed_bytes";

    pub const WRITE_RECEIVED_RECORDS: &str = "write_received_records";
    pub const WRITE_RECEIVED_BYTES: &str = "write_received_bytes";
    pub const WRITE_FAILED_RECORDS: &str = "write_failed_records";
    pub const WRITE_FAILED_BYTES: &str = "write_failed_bytes";

    pub const TOTAL_READ_RECORDS: &str = "total_read_records";
    pub const TOTAL_READ_BYTES: &str = "total_read_bytes";
    pub const TOTAL_ERROR_RECORDS: &str = "total_error_records";
    pub const TOTAL_ERROR_BYTES: &str = "total_error_bytes";
    pub const WRITE_SUCCEED_RECORDS: &str = "write_succeed_records";
    pub const WRITE_SUCCEED_BYTES: &str = "write_succeed_bytes";

    /// Nanoseconds producers spent blocked on a full channel.
    pub const WAIT_WRITER_TIME: &str = "wait_writer_time";
    /// Nanoseconds consumers spent blocked on an empty channel.
    pub const WAIT_READER_TIME: &str = "wait_reader_time";

    pub const TRANSFORMER_SUCCESS_RECORDS: &str = "transformer_success_records";
    pub const TRANSFORMER_FAILED_RECORDS: &str = "transformer_failed_records";
    pub const TRANSFORMER_FILTER_RECORDS: &str = "transformer_filter_records";
    /// Nanoseconds spent inside transform stages.
    pub const TRANSFORMER_USED_TIME: &str = "transformer_used_time";
}

/// Fill the derived totals, speeds and percentage of `now` using `old` as
/// the previous snapshot, and carry `old`'s cause over when `now` has none.
pub fn build_report(now: &Communication, old: &Communication, total_stages: u32) {
    let read_records = total_read_records(now);
    let read_bytes = total_read_bytes(now);
    now.set_long_counter(keys::TOTAL_READ_RECORDS, read_records);
    now.set_long_counter(keys::TOTAL_READ_BYTES, read_bytes);
    now.set_long_counter(keys::TOTAL_ERROR_RECORDS, total_error_records(now));
    now.set_long_counter(keys::TOTAL_ERROR_BYTES, total_error_bytes(now));
    now.set_long_counter(keys::WRITE_SUCCEED_RECORDS, write_succeed_records(now));
    now.set_long_counter(keys::WRITE_SUCCEED_BYTES, write_succeed_bytes(now));

    let seconds = elapsed_seconds(old.timestamp(), now.timestamp());
    let byte_speed = (read_bytes - total_read_bytes(old)) / seconds;
    let record_speed = (read_records - total_read_records(old)) / seconds;
    now.set_long_counter(keys::BYTE_SPEED, byte_speed.max(0));
    now.set_long_counter(keys::RECORD_SPEED, record_speed.max(0));

    now.set_double_counter(
        keys::PERCENTAGE,
        percentage(now.long_counter(keys::STAGE), total_stages),
    );

    if let Some(cause) = old.cause() {
        now.set_cause(cause);
    }
}

/// Whole seconds between two millisecond timestamps, never below one.
#[must_use]
pub fn elapsed_seconds(old_millis: i64, now_millis: i64) -> i64 {
    let interval = now_millis - old_millis;
    if interval <= 1000 {
        1
    } else {
        interval / 1000
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(stage: i64, total_stages: u32) -> f64 {
    if total_stages == 0 {
        0.0
    } else {
        stage as f64 / f64::from(total_stages)
    }
}

/// Records read, succeeded plus failed.
#[must_use]
pub fn total_read_records(comm: &Communication) -> i64 {
    comm.long_counter(keys::READ_SUCCEED_RECORDS) + comm.long_counter(keys::READ_FAILED_RECORDS)
}

/// Bytes read, succeeded plus failed.
#[must_use]
pub fn total_read_bytes(comm: &Communication) -> i64 {
    comm.long_counter(keys::READ_SUCCEED_BYTES) + comm.long_counter(keys::READ_FAILED_BYTES)
}

/// Dirty records on either side.
#[must_use]
pub fn total_error_records(comm: &Communication) -> i64 {
    comm.long_counter(keys::READ_FAILED_RECORDS) + comm.long_counter(keys::WRITE_FAILED_RECORDS)
}

#[must_use]
pub fn total_error_bytes(comm: &Communication) -> i64 {
    comm.long_counter(keys::READ_FAILED_BYTES) + comm.long_counter(keys::WRITE_FAILED_BYTES)
}

#[must_use]
pub fn write_succeed_records(comm: &Communication) -> i64 {
    comm.long_counter(keys::WRITE_RECEIVED_RECORDS) - comm.long_counter(keys::WRITE_FAILED_RECORDS)
}

#[must_use]
pub fn write_succeed_bytes(comm: &Communication) -> i64 {
    comm.long_counter(keys::WRITE_RECEIVED_BYTES) - comm.long_counter(keys::WRITE_FAILED_BYTES)
}

// ── One-line snapshot ───────────────────────────────────────────────

/// Render totals, speed, errors, wait times, transformer metrics (when any
/// is non-zero) and completion percentage on one line.
#[must_use]
pub fn snapshot_line(comm: &Communication) -> String {
    let mut line = format!(
        "Total {} records, {} bytes | Speed {}/s, {} records/s | Error {} records, {} bytes | \
         All Task WaitWriterTime {} | All Task WaitReaderTime {} | ",
        comm.long_counter(keys::TOTAL_READ_RECORDS),
        comm.long_counter(keys::TOTAL_READ_BYTES),
        format_bytes(comm.long_counter(keys::BYTE_SPEED)),
        comm.long_counter(keys::RECORD_SPEED),
        comm.long_counter(keys::TOTAL_ERROR_RECORDS),
        comm.long_counter(keys::TOTAL_ERROR_BYTES),
        format_nanos(comm.long_counter(keys::WAIT_WRITER_TIME)),
        format_nanos(comm.long_counter(keys::WAIT_READER_TIME)),
    );

    let success = comm.long_counter(keys::TRANSFORMER_SUCCESS_RECORDS);
    let failed = comm.long_counter(keys::TRANSFORMER_FAILED_RECORDS);
    let filtered = comm.long_counter(keys::TRANSFORMER_FILTER_RECORDS);
    let used = comm.long_counter(keys::TRANSFORMER_USED_TIME);
    if success != 0 || failed != 0 || filtered != 0 || used != 0 {
        line.push_str(&format!(
            "Transformer Success {success} records | Transformer Error {failed} records | \
             Transformer Filter {filtered} records | Transformer usedTime {} | ",
            format_nanos(used)
        ));
    }

    line.push_str(&format!(
        "Percentage {:.2}%",
        comm.double_counter(keys::PERCENTAGE) * 100.0
    ));
    line
}

/// Human-readable byte size with a 1024 base and two decimals.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2}{}", UNITS[unit])
}

#[allow(clippy::cast_precision_loss)]
fn format_nanos(nanos: i64) -> String {
    format!("{:.3}s", nanos as f64 / 1_000_000_000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::communication::Cause;

    fn snapshot(ts: i64, read_bytes: i64, read_records: i64) -> Communication {
        let comm = Communication::new();
        comm.set_timestamp(ts);
        comm.set_long_counter(keys::READ_SUCCEED_BYTES, read_bytes);
        comm.set_long_counter(keys::READ_SUCCEED_RECORDS, read_records);
        comm
    }

    #[test]
    fn speed_over_two_seconds() {
        let old = snapshot(10_000, 1000, 10);
        let now = snapshot(12_000, 5000, 50);
        build_report(&now, &old, 1);
        assert_eq!(now.long_counter(keys::BYTE_SPEED), 2000);
        assert_eq!(now.long_counter(keys::RECORD_SPEED), 20);
    }

    #[test]
    fn short_interval_uses_one_second_floor() {
        let old = snapshot(10_000, 1000, 0);
        let now = snapshot(10_400, 5000, 0);
        build_report(&now, &old, 1);
        assert_eq!(now.long_counter(keys::BYTE_SPEED), 4000);

        assert_eq!(elapsed_seconds(0, 1000), 1);
        assert_eq!(elapsed_seconds(0, 1999), 1);
        assert_eq!(elapsed_seconds(5000, 0), 1);
    }

    #[test]
    fn negative_speed_is_clamped() {
        let old = snapshot(0, 9000, 90);
        let now = snapshot(3000, 3000, 30);
        build_report(&now, &old, 1);
        assert_eq!(now.long_counter(keys::BYTE_SPEED), 0);
        assert_eq!(now.long_counter(keys::RECORD_SPEED), 0);
    }

    #[test]
    fn totals_and_percentage() {
        let now = Communication::new();
        now.set_long_counter(keys::READ_SUCCEED_RECORDS, 90);
        now.set_long_counter(keys::READ_FAILED_RECORDS, 10);
        now.set_long_counter(keys::WRITE_RECEIVED_RECORDS, 90);
        now.set_long_counter(keys::WRITE_FAILED_RECORDS, 5);
        now.set_long_counter(keys::STAGE, 3);
        build_report(&now, &Communication::new(), 4);

        assert_eq!(now.long_counter(keys::TOTAL_READ_RECORDS), 100);
        assert_eq!(now.long_counter(keys::TOTAL_ERROR_RECORDS), 15);
        assert_eq!(now.long_counter(keys::WRITE_SUCCEED_RECORDS), 85);
        assert!((now.double_counter(keys::PERCENTAGE) - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn cause_carried_from_old() {
        let old = Communication::new();
        old.set_cause(Cause::new(anyhow::anyhow!("earlier failure")));
        let now = Communication::new();
        build_report(&now, &old, 1);
        assert_eq!(now.cause_message(), "earlier failure");
    }

    #[test]
    fn snapshot_line_omits_idle_transformers() {
        let comm = Communication::new();
        comm.set_long_counter(keys::TOTAL_READ_RECORDS, 12);
        comm.set_long_counter(keys::TOTAL_READ_BYTES, 2048);
        comm.set_long_counter(keys::BYTE_SPEED, 1536);
        comm.set_long_counter(keys::WAIT_WRITER_TIME, 1_500_000_000);
        comm.set_double_counter(keys::PERCENTAGE, 0.5);
        let line = snapshot_line(&comm);
        assert_eq!(
            line,
            "Total 12 records, 2048 bytes | Speed 1.50KB/s, 0 records/s | Error 0 records, 0 bytes | \
             All Task WaitWriterTime 1.500s | All Task WaitReaderTime 0.000s | Percentage 50.00%"
        );
    }

    #[test]
    fn snapshot_line_includes_active_transformers() {
        let comm = Communication::new();
        comm.set_long_counter(keys::TRANSFORMER_FILTER_RECORDS, 2);
        let line = snapshot_line(&comm);
        assert!(line.contains("Transformer Filter 2 records"));
        assert!(line.contains("Transformer usedTime 0.000s | Percentage 0.00%"));
    }

    #[test]
    fn byte_units() {
        assert_eq!(format_bytes(512), "512.00B");
        assert_eq!(format_bytes(8 * 1024 * 1024), "8.00MB");
        assert_eq!(format_bytes(3 * 1024_i64.pow(4)), "3.00TB");
    }
}
