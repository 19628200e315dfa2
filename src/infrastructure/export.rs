use std::fmt::Write;

use chrono::{DateTime, NaiveDate, TimeZone};

use crate::domain::{customer::CustomerRecord, membership, Entity};

pub const CSV_HEADER: &str = "ID,Name,Phone,Address,Start,End,RemainingUses,Status";

/// 既定の日付書式（`2024/1/10`）
pub const DEFAULT_DATE_FORMAT: &str = "%Y/%-m/%-d";

/// CSV出力
#[derive(Clone, Debug)]
pub struct CsvExport {
    date_format: String,
}

impl CsvExport {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
        }
    }

    pub fn render<Tz: TimeZone>(&self, records: &[CustomerRecord], now: &DateTime<Tz>) -> String {
        let mut csv = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 96);
        csv.push_str(CSV_HEADER);
        csv.push('\n');
        for record in records {
            // String への書き込みは失敗しない
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{}",
                record.id(),
                quote(record.name()),
                quote(record.phone()),
                quote(record.address()),
                record.enrollment_start().format(&self.date_format),
                record.enrollment_end().format(&self.date_format),
                record.remaining_uses(),
                membership::status(record, now),
            );
        }
        csv
    }
}

impl Default for CsvExport {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

pub fn to_csv<Tz: TimeZone>(records: &[CustomerRecord], now: &DateTime<Tz>) -> String {
    CsvExport::default().render(records, now)
}

/// `<prefix>_<YYYY-MM-DD>.csv`
pub fn export_file_name(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y-%m-%d"))
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
