//! Initial population of the `todo` set.
//!
//! Reads candidate addresses from a simple CSV export (one record per line,
//! `Name,Email address` by default), normalizes them, drops obvious
//! gibberish, and adds the rest to `todo`. Set semantics absorb duplicates.

use std::io::BufRead;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Item, SetName};
use crate::store::{self, QueueStore};

/// Column holding the address in the default export layout.
pub const DEFAULT_COLUMN: usize = 1;

static ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$",
    )
    .expect("address regex is valid")
});

/// Trim, strip surrounding quotes and lowercase. Empty input yields `None`.
pub fn normalize(raw: &str) -> Option<Item> {
    let value = raw.trim().trim_matches('"').trim().to_lowercase();
    (!value.is_empty()).then(|| Item(value))
}

/// Cheap syntactic filter applied before any network check.
pub fn is_plausible_address(candidate: &str) -> bool {
    if candidate.len() > 254 {
        return false;
    }
    match candidate.rsplit_once('@') {
        Some((local, _)) if local.len() <= 64 => ADDRESS.is_match(candidate),
        _ => false,
    }
}

/// Split one CSV line into fields, honouring double-quoted fields and `""`
/// escapes. Embedded newlines are not supported.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => in_quotes = !in_quotes,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Extract one column from every line of a CSV source.
///
/// Lines that have fewer columns are skipped.
pub fn read_csv_column<R: BufRead>(reader: R, column: usize) -> Result<Vec<String>> {
    let mut values = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        if let Some(value) = split_csv_line(line).into_iter().nth(column) {
            values.push(value);
        }
    }
    Ok(values)
}

/// Outcome of seeding the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Raw values offered.
    pub offered: usize,
    /// Values dropped by normalization or the plausibility filter.
    pub filtered: usize,
    /// `todo` cardinality after seeding.
    pub todo: u64,
}

/// Add items to `todo`, optionally clearing all three sets first.
pub async fn seed<I, S>(store: &dyn QueueStore, raw: I, reset: bool) -> Result<SeedReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if reset {
        store::clear_all(store).await?;
        info!("cleared todo, accepted and rejected sets");
    }

    let mut report = SeedReport::default();
    for value in raw {
        report.offered += 1;
        match normalize(value.as_ref()) {
            Some(item) if is_plausible_address(item.as_str()) => {
                store.add(SetName::Todo, &item).await?;
            }
            _ => {
                debug!(value = value.as_ref(), "skipping implausible record");
                report.filtered += 1;
            }
        }
    }

    report.todo = store.cardinality(SetName::Todo).await?;
    info!(
        offered = report.offered,
        filtered = report.filtered,
        todo = report.todo,
        "queue seeded"
    );
    Ok(report)
}
