use serde::{Deserialize, Serialize};

use freightdesk_core::{DomainError, DomainResult, ValueObject};

/// Kind of numbered document. Doubles as the sequence lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    LorryReceipt,
    Invoice,
    TruckHiringNote,
}

impl DocumentKind {
    /// Stable sequence name used as the storage key for ranges and counters.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::LorryReceipt => "lorry_receipt",
            DocumentKind::Invoice => "invoice",
            DocumentKind::TruckHiringNote => "truck_hiring_note",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "lorry_receipt" => Ok(DocumentKind::LorryReceipt),
            "invoice" => Ok(DocumentKind::Invoice),
            "truck_hiring_note" => Ok(DocumentKind::TruckHiringNote),
            other => Err(DomainError::validation(format!(
                "unknown document kind: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered, human-facing document number.
///
/// Range-issued numbers carry the range prefix (`"INV-1042"`); legacy-counter
/// numbers render bare (`"1042"`). The prefix is concatenated verbatim - any
/// separator belongs to the configured prefix itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentNumber {
    pub prefix: Option<String>,
    pub value: u64,
}

impl DocumentNumber {
    pub fn prefixed(prefix: impl Into<String>, value: u64) -> Self {
        Self {
            prefix: Some(prefix.into()),
            value,
        }
    }

    pub fn bare(value: u64) -> Self {
        Self {
            prefix: None,
            value,
        }
    }

    /// The string stored on the document and shown to users.
    pub fn render(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}{}", self.value),
            None => self.value.to_string(),
        }
    }
}

impl ValueObject for DocumentNumber {}

impl core::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.render())
    }
}

/// Configured numbering range for one document kind.
///
/// `current_number` is the next value to be issued. Issuance fails once
/// `current_number > end_number` unless `allow_outside_range` permits falling
/// back to the legacy counter. At most one active range per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingRange {
    pub document_kind: DocumentKind,
    pub prefix: String,
    pub start_number: u64,
    pub end_number: u64,
    pub current_number: u64,
    pub allow_manual_entry: bool,
    pub allow_outside_range: bool,
}

impl NumberingRange {
    /// Create a fresh range; issuance starts at `start_number`.
    pub fn new(
        document_kind: DocumentKind,
        prefix: impl Into<String>,
        start_number: u64,
        end_number: u64,
        allow_manual_entry: bool,
        allow_outside_range: bool,
    ) -> DomainResult<Self> {
        if start_number > end_number {
            return Err(DomainError::validation(format!(
                "start_number {start_number} must not exceed end_number {end_number}"
            )));
        }
        Ok(Self {
            document_kind,
            prefix: prefix.into(),
            start_number,
            end_number,
            current_number: start_number,
            allow_manual_entry,
            allow_outside_range,
        })
    }

    /// Replace this range's configuration in place, preserving issuance
    /// position where the new bounds allow it.
    ///
    /// `current_number` is kept unless it falls outside the new bounds:
    /// below `start_number` it is rebased to `start_number`; above
    /// `end_number` it is rebased to `start_number` only when the new
    /// configuration forbids outside-range issuance. Returns whether a rebase
    /// happened - a rebase restarts numbering and can re-issue values already
    /// consumed, which callers are expected to surface.
    pub fn reconfigured(
        &self,
        prefix: impl Into<String>,
        start_number: u64,
        end_number: u64,
        allow_manual_entry: bool,
        allow_outside_range: bool,
    ) -> DomainResult<(Self, bool)> {
        let mut next = Self::new(
            self.document_kind,
            prefix,
            start_number,
            end_number,
            allow_manual_entry,
            allow_outside_range,
        )?;

        let mut rebased = false;
        if self.current_number < start_number {
            rebased = true; // next.current_number already == start_number
        } else if self.current_number > end_number && !allow_outside_range {
            rebased = true;
        } else {
            next.current_number = self.current_number;
        }

        Ok((next, rebased))
    }

    /// True once every in-range value has been issued.
    pub fn is_exhausted(&self) -> bool {
        self.current_number > self.end_number
    }

    /// Issue the next in-range value and advance the position.
    ///
    /// Returns `None` when exhausted. Callers providing shared access must
    /// run this inside a single atomic read-modify-write (one write-lock
    /// hold, or one conditional UPDATE) - never as a separate read and write.
    pub fn issue_next(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let value = self.current_number;
        self.current_number += 1;
        Some(value)
    }

    /// Render an issued value under this range's prefix.
    pub fn number_for(&self, value: u64) -> DocumentNumber {
        if self.prefix.is_empty() {
            DocumentNumber::bare(value)
        } else {
            DocumentNumber::prefixed(self.prefix.clone(), value)
        }
    }
}

/// Unbounded, monotonic fallback counter.
///
/// Used when no range is configured for a kind, or when an exhausted range
/// permits outside-range issuance. Mutated only by increment; the first
/// increment of a fresh counter yields 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub name: String,
    pub value: u64,
}

impl SequenceCounter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: 0,
        }
    }

    /// Increment and return the new value.
    pub fn increment(&mut self) -> u64 {
        self.value += 1;
        self.value
    }
}
