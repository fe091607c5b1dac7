use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::context::{ListingContext, ACCOMMODATION_TYPE};
use crate::record::OfferRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {row} has field `{field}` which is not in the header")]
    FieldNotInHeader { field: String, row: usize },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ── Accumulation ──

/// Accepted offers in discovery order plus the ids seen so far.
#[derive(Debug, Default)]
pub struct ResultSet {
    records: Vec<OfferRecord>,
    seen: HashSet<u64>,
}

impl ResultSet {
    pub fn contains(&self, id: u64) -> bool {
        self.seen.contains(&id)
    }

    /// Returns false and drops `record` if `id` was already accepted.
    pub fn accumulate(&mut self, id: u64, record: OfferRecord) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn records(&self) -> &[OfferRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&OfferRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Progress counters. Not persisted.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub accepted: usize,
    pub average_price: f64,
}

impl RunStats {
    /// Count one acceptance and fold its price into the running mean.
    ///
    /// Offers without a price count as 0, which drags the mean down. The figure is
    /// only shown on the progress line.
    pub fn record(&mut self, price: Option<f64>) {
        self.accepted += 1;
        let n = self.accepted as f64;
        self.average_price = (self.average_price * (n - 1.0) + price.unwrap_or(0.0)) / n;
    }
}

// ── Output ──

/// What to do with a record field the header does not list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeaderPolicy {
    /// Leave the field out of the row.
    #[default]
    DropExtra,
    /// Fail the write.
    Strict,
}

/// Semicolon-delimited output file, rewritten in full on every persist.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    policy: HeaderPolicy,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>, policy: HeaderPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write every accumulated record. The header is taken from the most recently
    /// accepted record; earlier records are projected onto it.
    pub fn persist(&self, results: &ResultSet) -> Result<(), StoreError> {
        let Some(last) = results.last() else {
            return Ok(());
        };
        let header: Vec<&str> = last.keys().collect();

        if self.policy == HeaderPolicy::Strict {
            check_fields(results.records(), &header)?;
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_path(&self.path)?;
        writer.write_record(&header)?;
        for record in results.records() {
            writer.write_record(header.iter().map(|key| cell(record.get(key))))?;
        }
        writer.flush()?;

        debug!(path = %self.path.display(), rows = results.len(), "results written");
        Ok(())
    }
}

/// `cian_flat_sale_1_100_moskva_15_Oct_2026_10_00_00_000000.csv`
pub fn file_name(ctx: &ListingContext, started: NaiveDateTime) -> String {
    let location = translit(&ctx.location.to_lowercase());
    let location = location
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace('\'', "");
    format!(
        "cian_{}_{}_{}_{}_{}_{}.csv",
        ACCOMMODATION_TYPE,
        ctx.category.as_str(),
        ctx.start_page,
        ctx.end_page,
        location,
        started.format("%d_%b_%Y_%H_%M_%S_%6f"),
    )
}

/// Lowercase Cyrillic to Latin. Hard and soft signs become apostrophes.
fn translit(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let latin = match c {
            'а' => "a",
            'б' => "b",
            'в' => "v",
            'г' => "g",
            'д' => "d",
            'е' | 'ё' | 'э' => "e",
            'ж' => "zh",
            'з' => "z",
            'и' => "i",
            'й' => "j",
            'к' => "k",
            'л' => "l",
            'м' => "m",
            'н' => "n",
            'о' => "o",
            'п' => "p",
            'р' => "r",
            'с' => "s",
            'т' => "t",
            'у' => "u",
            'ф' => "f",
            'х' => "h",
            'ц' => "ts",
            'ч' => "ch",
            'ш' => "sh",
            'щ' => "sch",
            'ъ' | 'ь' => "'",
            'ы' => "y",
            'ю' => "ju",
            'я' => "ja",
            other => {
                out.push(other);
                continue;
            }
        };
        out.push_str(latin);
    }
    out
}

fn check_fields(records: &[OfferRecord], header: &[&str]) -> Result<(), StoreError> {
    for (row, record) in records.iter().enumerate() {
        if let Some(field) = record.keys().find(|k| !header.contains(k)) {
            return Err(StoreError::FieldNotInHeader {
                field: field.to_string(),
                row,
            });
        }
    }
    Ok(())
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
