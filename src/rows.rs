//! Row loading and selection at the service / CLI boundary
//!
//! Score rows and wave-engine state rows arrive as JSON arrays, zstd-compressed
//! JSON arrays, or CSV files. They are joined by timestamp, filtered, and only
//! then normalized into strictly-typed scores.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::interpretation_core::{RawIntervalRow, RawIntervalScores};

/// Upper bound on rows pulled into one diagnostics population
pub const MAX_POPULATION: usize = 10_000;

/// Normalize a timestamp to second precision UTC (`2025-01-02T14:30:00Z`).
/// Returns `None` for anything unparseable.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Postgres style offsets: "2025-01-02 14:30:00+00"
            DateTime::parse_from_str(&format!("{}:00", trimmed), "%Y-%m-%d %H:%M:%S%.f%:z")
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|naive| naive.and_utc())
        })?;
    Some(parsed.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Join each score row with the wave-state row sharing its timeframe and
/// timestamp. State rows without a timeframe match on timestamp alone.
pub fn join_wave_states(rows: Vec<RawIntervalRow>, states: &[RawIntervalRow]) -> Vec<RawIntervalRow> {
    let mut index: HashMap<(Option<String>, String), &RawIntervalRow> = HashMap::new();
    for state in states {
        if let Some(ts) = state.timestamp.as_deref().and_then(normalize_timestamp) {
            index.entry((state.timeframe.clone(), ts)).or_insert(state);
        }
    }

    let mut joined = 0usize;
    let out: Vec<RawIntervalRow> = rows
        .into_iter()
        .map(|row| {
            let state = row
                .timestamp
                .as_deref()
                .and_then(normalize_timestamp)
                .and_then(|ts| {
                    index
                        .get(&(row.timeframe.clone(), ts.clone()))
                        .or_else(|| index.get(&(None, ts)))
                        .copied()
                });
            if state.is_some() {
                joined += 1;
            }
            row.with_wave_state(state)
        })
        .collect();
    debug!("Joined {}/{} rows with wave state", joined, out.len());
    out
}

/// Row selection for a diagnostics population or a single-bar lookup
#[derive(Debug, Clone, Default)]
pub struct RowFilter {
    pub symbol: Option<String>,
    pub timeframe: Option<String>,
    /// Inclusive lower bound
    pub from: Option<String>,
    /// Inclusive upper bound
    pub to: Option<String>,
    pub limit: Option<usize>,
}

impl RowFilter {
    /// Rows matching every set criterion, ordered by timestamp ascending,
    /// keeping at most `limit` (clamped to [`MAX_POPULATION`]) of the earliest.
    pub fn apply(&self, rows: Vec<RawIntervalRow>) -> Result<Vec<RawIntervalRow>> {
        let from = self.bound(self.from.as_deref(), "from")?;
        let to = self.bound(self.to.as_deref(), "to")?;

        let mut selected: Vec<(Option<String>, RawIntervalRow)> = rows
            .into_iter()
            .filter(|r| self.matches_series(r))
            .map(|r| (r.timestamp.as_deref().and_then(normalize_timestamp), r))
            .filter(|(ts, _)| match (&from, ts) {
                (Some(from), Some(ts)) => ts >= from,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|(ts, _)| match (&to, ts) {
                (Some(to), Some(ts)) => ts <= to,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .collect();

        // Normalized RFC 3339 strings order chronologically
        selected.sort_by(|a, b| a.0.cmp(&b.0));
        selected.truncate(self.limit.unwrap_or(MAX_POPULATION).min(MAX_POPULATION));
        Ok(selected.into_iter().map(|(_, r)| r).collect())
    }

    /// Symbol and timeframe match only; no time window or limit
    pub fn matches_series(&self, row: &RawIntervalRow) -> bool {
        matches_text(&self.symbol, &row.symbol) && matches_text(&self.timeframe, &row.timeframe)
    }

    fn bound(&self, raw: Option<&str>, name: &str) -> Result<Option<String>> {
        match raw {
            None => Ok(None),
            Some(raw) => match normalize_timestamp(raw) {
                Some(ts) => Ok(Some(ts)),
                None => bail!("Invalid {} timestamp: {}", name, raw),
            },
        }
    }
}

fn matches_text(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        None => true,
        Some(w) => actual.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(w)),
    }
}

/// The row at `timestamp`, or the latest row when no timestamp is given
pub fn find_bar<'a>(rows: &'a [RawIntervalRow], timestamp: Option<&str>) -> Result<Option<&'a RawIntervalRow>> {
    let keyed = rows
        .iter()
        .filter_map(|r| r.timestamp.as_deref().and_then(normalize_timestamp).map(|ts| (ts, r)));
    match timestamp {
        Some(raw) => {
            let Some(wanted) = normalize_timestamp(raw) else {
                bail!("Invalid timestamp format: {}", raw);
            };
            Ok(keyed.filter(|(ts, _)| *ts == wanted).map(|(_, r)| r).next())
        }
        None => Ok(keyed.max_by(|a, b| a.0.cmp(&b.0)).map(|(_, r)| r)),
    }
}

/// Latest row per timeframe, ordered by timeframe name
pub fn latest_per_timeframe(rows: &[RawIntervalRow]) -> Vec<&RawIntervalRow> {
    let mut latest: BTreeMap<String, (String, &RawIntervalRow)> = BTreeMap::new();
    for row in rows {
        let (Some(tf), Some(ts)) = (
            row.timeframe.clone(),
            row.timestamp.as_deref().and_then(normalize_timestamp),
        ) else {
            continue;
        };
        match latest.get(&tf) {
            Some((seen, _)) if *seen >= ts => {}
            _ => {
                latest.insert(tf, (ts, row));
            }
        }
    }
    latest.into_values().map(|(_, row)| row).collect()
}

/// Normalize a batch of joined rows
pub fn to_scores(rows: &[RawIntervalRow]) -> Vec<RawIntervalScores> {
    rows.iter().map(RawIntervalScores::from_row).collect()
}

/// Load rows from `.json`, `.json.zst` or `.csv`
pub fn load_rows(path: &Path) -> Result<Vec<RawIntervalRow>> {
    let name = path.to_string_lossy().to_lowercase();
    let rows = if name.ends_with(".json.zst") {
        let compressed = std::fs::read(path)
            .with_context(|| format!("Failed to read row file: {:?}", path))?;
        let json = zstd::decode_all(&compressed[..])
            .with_context(|| format!("Failed to decompress row file: {:?}", path))?;
        serde_json::from_slice(&json)
            .with_context(|| format!("Row file is not a JSON array of rows: {:?}", path))?
    } else if name.ends_with(".json") {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read row file: {:?}", path))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("Row file is not a JSON array of rows: {:?}", path))?
    } else if name.ends_with(".csv") {
        load_csv_rows(path)?
    } else {
        bail!("Unsupported row file (expected .json, .json.zst or .csv): {:?}", path);
    };
    info!("Loaded {} rows from {:?}", rows.len(), path);
    Ok(rows)
}

/// CSV with a header row; empty cells are absent, everything else is kept as
/// text and normalized like any other loosely-typed value.
fn load_csv_rows(path: &Path) -> Result<Vec<RawIntervalRow>> {
    let file = File::open(path).with_context(|| format!("Failed to open file: {:?}", path))?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let record: HashMap<String, String> = result.with_context(|| "Failed to parse CSV row")?;
        let object: Map<String, Value> = record
            .into_iter()
            .filter(|(_, v)| !v.trim().is_empty())
            .map(|(k, v)| (k.trim().to_string(), Value::String(v)))
            .collect();
        rows.push(serde_json::from_value(Value::Object(object))?);
    }
    Ok(rows)
}
