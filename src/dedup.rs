use std::collections::HashSet;

use tracing::{info, warn};

use crate::record::ExtractedRecord;
use crate::store::RecordStore;

/// Remembers every stored `resource_url` so reruns append only new ones.
#[derive(Debug, Default)]
pub struct DedupGate {
    prior: Vec<ExtractedRecord>,
    seen: HashSet<String>,
    admitted: Vec<ExtractedRecord>,
}

impl DedupGate {
    /// Read prior records. An unreadable store counts as empty.
    pub fn load(store: &mut dyn RecordStore) -> Self {
        match store.load_all() {
            Ok(records) => Self::from_prior(records),
            Err(e) => {
                warn!(store = %store.location(), error = %e, "prior records unreadable; starting empty");
                Self::default()
            }
        }
    }

    /// Duplicate keys among prior records collapse to the first one seen.
    pub fn from_prior(records: Vec<ExtractedRecord>) -> Self {
        let mut gate = DedupGate::default();
        let total = records.len();
        for r in records {
            if gate.seen.insert(r.resource_url.clone()) {
                gate.prior.push(r);
            }
        }
        if gate.prior.len() < total {
            info!(dropped = total - gate.prior.len(), "duplicate prior records collapsed");
        }
        gate
    }

    #[cfg(test)]
    pub fn contains(&self, resource_url: &str) -> bool {
        self.seen.contains(resource_url)
    }

    /// Accept a new record unless its key is already known.
    pub fn admit(&mut self, record: ExtractedRecord) -> bool {
        if !self.seen.insert(record.resource_url.clone()) {
            return false;
        }
        self.admitted.push(record);
        true
    }

    pub fn prior(&self) -> &[ExtractedRecord] {
        &self.prior
    }

    #[cfg(test)]
    pub fn admitted(&self) -> &[ExtractedRecord] {
        &self.admitted
    }

    /// Prior records in their order, then new ones in admission order.
    pub fn combined(&self) -> Vec<ExtractedRecord> {
        self.prior.iter().chain(&self.admitted).cloned().collect()
    }
}

// ── Tests ──
