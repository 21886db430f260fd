//! Assumption audit trail and ordered fallback chains.
//!
//! Every figure that feeds a valuation is tagged with where it came from.
//! Figures tagged [`Provenance::Defaulted`] or [`Provenance::Estimated`] are
//! assumptions rather than observations, and the caller must be able to tell
//! them apart in the final report.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a value used in a computation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Passed in explicitly by the caller.
    Supplied,
    /// Read from the financial-statement table or the data provider.
    Observed,
    /// Caller-supplied value replacing an observed one.
    Overridden,
    /// Computed from other supplied or observed values.
    Derived,
    /// Missing optional input replaced by a documented default.
    Defaulted,
    /// Heuristic stand-in for a value that could not be observed.
    Estimated,
}

impl Provenance {
    /// True for values the caller should treat as assumptions.
    pub fn is_assumption(self) -> bool {
        matches!(self, Provenance::Defaulted | Provenance::Estimated)
    }
}

/// One audit-trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub field: String,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Decimal>,
    /// Name of the candidate that won a fallback chain, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Ordered list of [`Assumption`]s. Serializes as a plain array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssumptionLog {
    entries: Vec<Assumption>,
}

impl AssumptionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: &str, provenance: Provenance, value: Option<Decimal>) {
        self.push(Assumption {
            field: field.to_string(),
            provenance,
            value,
            source: None,
            note: None,
        });
    }

    pub fn record_with_note(
        &mut self,
        field: &str,
        provenance: Provenance,
        value: Option<Decimal>,
        note: impl Into<String>,
    ) {
        self.push(Assumption {
            field: field.to_string(),
            provenance,
            value,
            source: None,
            note: Some(note.into()),
        });
    }

    /// Record the winner of a fallback chain.
    pub fn record_resolved(&mut self, field: &str, provenance: Provenance, resolved: &Resolved<Decimal>) {
        self.push(Assumption {
            field: field.to_string(),
            provenance,
            value: Some(resolved.value),
            source: Some(resolved.source.clone()),
            note: None,
        });
    }

    /// Later entries for the same field replace earlier ones.
    pub fn push(&mut self, entry: Assumption) {
        self.entries.retain(|e| e.field != entry.field);
        self.entries.push(entry);
    }

    /// Merge another log, prefixing its field names with `scope.`.
    pub fn extend_scoped(&mut self, scope: &str, other: &AssumptionLog) {
        for entry in &other.entries {
            let mut scoped = entry.clone();
            scoped.field = format!("{scope}.{}", entry.field);
            self.push(scoped);
        }
    }

    pub fn get(&self, field: &str) -> Option<&Assumption> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn provenance_of(&self, field: &str) -> Option<Provenance> {
        self.get(field).map(|e| e.provenance)
    }

    /// Entries that are defaults or estimates.
    pub fn assumed(&self) -> impl Iterator<Item = &Assumption> {
        self.entries.iter().filter(|e| e.provenance.is_assumption())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assumption> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Fallback chains
// ---------------------------------------------------------------------------

/// Extracts a candidate value from a context, or `None` when absent.
pub type Extractor<C, T> = fn(&C) -> Option<T>;

/// A value together with the name of the candidate that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: String,
}

/// Evaluate `(source, extractor)` candidates in priority order and stop at
/// the first one that yields a value.
pub fn resolve_first<C, T>(ctx: &C, candidates: &[(&'static str, Extractor<C, T>)]) -> Option<Resolved<T>> {
    candidates.iter().find_map(|(source, extract)| {
        extract(ctx).map(|value| Resolved {
            value,
            source: (*source).to_string(),
        })
    })
}

/// Sum every candidate that yields a value. `None` when none do.
pub fn sum_present<C>(ctx: &C, candidates: &[(&'static str, Extractor<C, Decimal>)]) -> Option<Resolved<Decimal>> {
    let hits: Vec<(&str, Decimal)> = candidates
        .iter()
        .filter_map(|(source, extract)| extract(ctx).map(|v| (*source, v)))
        .collect();
    if hits.is_empty() {
        return None;
    }
    Some(Resolved {
        value: hits.iter().map(|(_, v)| *v).sum(),
        source: hits.iter().map(|(s, _)| *s).collect::<Vec<_>>().join("+"),
    })
}
