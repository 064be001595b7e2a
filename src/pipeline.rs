use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::dedup::DedupGate;
use crate::parser::{ChainOutcome, DebugSampler, ExtractionChain, StaticSurface};
use crate::settings::EngineConfig;
use crate::source::{LoadedDocument, SourceDocument};
use crate::store::RecordStore;

/// Run stats returned after completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub documents: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub blocked: usize,
    pub no_essentials: usize,
    pub unreadable: usize,
    pub degraded_fields: usize,
}

impl RunStats {
    pub fn print(&self) {
        println!(
            "Processed {} documents: {} appended, {} already stored, {} blocked, {} without title/price, {} unreadable ({} degraded fields).",
            self.documents,
            self.appended,
            self.duplicates,
            self.blocked,
            self.no_essentials,
            self.unreadable,
            self.degraded_fields,
        );
    }
}

/// Run the chain over one loaded document.
pub fn extract_document(
    chain: &ExtractionChain<'_>,
    doc: &LoadedDocument,
    sampler: &mut DebugSampler,
) -> ChainOutcome {
    let mut surface = StaticSurface::new(&doc.markup);
    if let Some(revealed) = &doc.revealed {
        surface = surface.with_revealed(revealed);
    }
    chain.run(&doc.markup, &doc.resource_url, &mut surface, sampler)
}

/// Extract every document in order, appending each new record as soon as it
/// is ready so an interrupted run keeps what it finished.
pub fn run_documents(
    cfg: &EngineConfig,
    store: &mut dyn RecordStore,
    docs: &[SourceDocument],
) -> Result<RunStats> {
    let mut gate = DedupGate::load(store);
    let chain = ExtractionChain::new(cfg);
    let mut sampler = DebugSampler::new(&cfg.debug_dir, cfg.max_debug_samples);
    let mut stats = RunStats {
        documents: docs.len(),
        ..Default::default()
    };
    info!(
        prior = gate.prior().len(),
        documents = docs.len(),
        store = %store.location(),
        "starting run"
    );

    let pb = ProgressBar::new(docs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    for source in docs {
        pb.inc(1);
        let doc = match source.load() {
            Ok(doc) => doc,
            Err(e) => {
                warn!(path = %source.path.display(), error = %e, "document skipped");
                stats.unreadable += 1;
                continue;
            }
        };

        let outcome = extract_document(&chain, &doc, &mut sampler);
        stats.degraded_fields += outcome.failures.len();
        if outcome.blocked {
            stats.blocked += 1;
            continue;
        }
        if !outcome.record.has_essentials() {
            warn!(url = %doc.resource_url, "no essential data; skipping");
            sampler.sample_page(&format!("no-data-{}", doc.resource_url), &doc.markup);
            stats.no_essentials += 1;
            continue;
        }

        let record = outcome.record;
        if gate.admit(record.clone()) {
            store
                .append_all(std::slice::from_ref(&record))
                .with_context(|| format!("appending {}", record.resource_url))?;
            stats.appended += 1;
        } else {
            stats.duplicates += 1;
        }
    }

    pb.finish_and_clear();
    info!(
        appended = stats.appended,
        duplicates = stats.duplicates,
        total = gate.combined().len(),
        debug_samples = sampler.written(),
        "run finished"
    );
    Ok(stats)
}

// ── Tests ──
