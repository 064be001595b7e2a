use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::blobs::{self, NamedBlob};
use super::dom;
use super::extract::characteristics::Variant;
use super::extract::{extract_fields, phone, FieldFailure, Partial, SupplementaryFields};
use super::finders::value_at_path;
use super::reveal::{reveal_phone, RevealPlan};
use super::surface::Surface;
use super::tree::{mappings, DataTree};
use crate::error::{BlobError, RevealError};
use crate::record::{merge_preferring, ExtractedRecord, Field, SourceTier};
use crate::settings::EngineConfig;

const BLOCK_MARKERS: &[&str] = &[
    "you've been blocked",
    "access blocked",
    "captcha",
    "captcha-delivery",
    "datadome",
    "please enable js",
    "unusual activity",
];
const APOLLO_STATE: &str = "__APOLLO_STATE__";
const SUMMARY_SCRIPT_NAME: &str = "classified_summary_info";

static AD_CONTAINER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Ad:(\d+)$").unwrap());
static LISTING_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{5,}").unwrap());

/// Default block-page predicate: anti-bot interstitial markers.
pub fn is_block_page(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOCK_MARKERS.iter().any(|m| lower.contains(m))
}

/// Budget of debug dumps for one run. Passed explicitly; never global.
#[derive(Debug)]
pub struct DebugSampler {
    dir: PathBuf,
    budget: usize,
    written: usize,
}

impl DebugSampler {
    pub fn new(dir: impl Into<PathBuf>, budget: usize) -> Self {
        DebugSampler {
            dir: dir.into(),
            budget,
            written: 0,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), 0)
    }

    pub fn remaining(&self) -> usize {
        self.budget - self.written
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn sample_tree(&mut self, label: &str, tree: &Value) {
        if self.remaining() == 0 {
            return;
        }
        match serde_json::to_string_pretty(tree) {
            Ok(body) => self.write(label, "json", &body),
            Err(e) => warn!(label, error = %e, "debug tree not serializable"),
        }
    }

    pub fn sample_page(&mut self, label: &str, markup: &str) {
        if self.remaining() > 0 {
            self.write(label, "html", markup);
        }
    }

    fn write(&mut self, label: &str, ext: &str, body: &str) {
        let name: String = label
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let path = self.dir.join(format!("{:03}_{}.{}", self.written, name, ext));
        let result = fs::create_dir_all(&self.dir).and_then(|_| fs::write(&path, body));
        match result {
            Ok(()) => {
                self.written += 1;
                debug!(path = %path.display(), "debug sample written");
            }
            Err(e) => warn!(path = %path.display(), error = %e, "debug sample not written"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSource {
    pub field: Field,
    pub tier: SourceTier,
}

/// Result of running the chain on one document.
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutcome {
    pub record: ExtractedRecord,
    pub extras: SupplementaryFields,
    pub blocked: bool,
    pub tiers_consulted: Vec<SourceTier>,
    /// Which tier filled each field, in fill order.
    pub provenance: Vec<FieldSource>,
    pub failures: Vec<FieldFailure>,
}

impl ChainOutcome {
    fn new(url: &str) -> Self {
        ChainOutcome {
            record: ExtractedRecord::new(url),
            extras: SupplementaryFields::default(),
            blocked: false,
            tiers_consulted: Vec::new(),
            provenance: Vec::new(),
            failures: Vec::new(),
        }
    }

    fn consulted(&mut self, tier: SourceTier) {
        if !self.tiers_consulted.contains(&tier) {
            self.tiers_consulted.push(tier);
        }
    }

    /// Merge a lower-precedence result into this one.
    fn absorb(&mut self, partial: Partial, tier: SourceTier) {
        self.consulted(tier);
        let merged = merge_preferring(&self.record, &partial.record);
        for field in Field::ALL {
            if !self.record.is_set(field) && merged.is_set(field) {
                self.provenance.push(FieldSource { field, tier });
            }
        }
        self.record = merged;
        self.extras = self.extras.merge_preferring(&partial.extras);
        self.failures.extend(partial.failures);
    }

    #[cfg(test)]
    pub fn source_of(&self, field: Field) -> Option<SourceTier> {
        self.provenance
            .iter()
            .find(|s| s.field == field)
            .map(|s| s.tier)
    }
}

/// Four tiers per document. Earlier tiers win per field.
pub struct ExtractionChain<'c, B = fn(&str) -> bool> {
    config: &'c EngineConfig,
    is_blocked: B,
    plan: RevealPlan,
}

impl<'c> ExtractionChain<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self::with_block_predicate(config, is_block_page)
    }
}

impl<'c, B> ExtractionChain<'c, B>
where
    B: Fn(&str) -> bool,
{
    pub fn with_block_predicate(config: &'c EngineConfig, is_blocked: B) -> Self {
        ExtractionChain {
            config,
            is_blocked,
            plan: RevealPlan::standard(config.reveal_timeout()),
        }
    }

    pub fn run(
        &self,
        document: &str,
        url: &str,
        surface: &mut dyn Surface,
        sampler: &mut DebugSampler,
    ) -> ChainOutcome {
        let mut outcome = ChainOutcome::new(url);
        if (self.is_blocked)(document) {
            warn!(url, "block page; extraction skipped");
            outcome.blocked = true;
            return outcome;
        }

        let found = self.named_blob_tier(document, url, &mut outcome, sampler);
        if found == 0 {
            self.canonical_tier(document, url, &mut outcome, sampler);
        }

        if !outcome.record.has_essentials() {
            let markup = surface
                .rendered_markup()
                .unwrap_or_else(|| document.to_string());
            let ctx = self.config.field_context();
            outcome.absorb(dom::extract(&markup, url, &ctx), SourceTier::DomFallback);
        }

        if !outcome.record.is_set(Field::Phone) {
            self.reveal_tier(url, surface, &mut outcome);
        }

        info!(
            url,
            tiers = ?outcome.tiers_consulted,
            degraded = outcome.failures.len(),
            "document extracted"
        );
        outcome
    }

    /// Tier 1. Returns how many blobs parsed.
    fn named_blob_tier(
        &self,
        document: &str,
        url: &str,
        outcome: &mut ChainOutcome,
        sampler: &mut DebugSampler,
    ) -> usize {
        let found = blobs::locate_named(document, &self.config.blob_names);
        let ctx = self.config.field_context();
        for NamedBlob { name, tree } in &found {
            sampler.sample_tree(&format!("blob-{name}"), tree);
            let partial = extract_fields(tree, url, &ctx, &[Variant::Specs, Variant::VehicleAttributes]);
            outcome.absorb(partial, SourceTier::NamedBlob);
        }
        if outcome.record.has_essentials() {
            debug!(url, blobs = found.len(), "resolved from named blobs");
        }
        found.len()
    }

    /// Tier 2: page-level JSON, its embedded summary script, and the Apollo
    /// cache's obfuscated phone.
    fn canonical_tier(
        &self,
        document: &str,
        url: &str,
        outcome: &mut ChainOutcome,
        sampler: &mut DebugSampler,
    ) {
        let ctx = self.config.field_context();
        match blobs::locate_canonical(document, &self.config.canonical_script_id) {
            Ok(tree) => {
                sampler.sample_tree("canonical", &tree);
                match ad_subtree(&tree, url) {
                    Some(ad) => {
                        let partial = extract_fields(ad, url, &ctx, &[Variant::VehicleAttributes]);
                        outcome.absorb(partial, SourceTier::CanonicalTree);
                    }
                    None => debug!(url, "canonical tree carries no ad"),
                }

                if let Some(script) = summary_script(&tree) {
                    for blob in blobs::locate_named(script, &self.config.blob_names) {
                        let partial = extract_fields(&blob.tree, url, &ctx, &[Variant::Specs]);
                        outcome.absorb(partial, SourceTier::CanonicalTree);
                    }
                }
            }
            Err(BlobError::Missing { .. }) => debug!(url, "no canonical tree"),
            Err(e) => warn!(url, error = %e, "canonical tree unusable"),
        }

        if outcome.record.is_set(Field::Phone) {
            return;
        }
        match blobs::locate(document, APOLLO_STATE) {
            Ok(state) => {
                if let Ok(Some(number)) = phone::phone(&apollo_ads(&state)) {
                    let mut partial = Partial::default();
                    partial.record.phone = Some(number);
                    outcome.absorb(partial, SourceTier::CanonicalTree);
                }
            }
            Err(BlobError::Missing { .. }) => {}
            Err(e) => debug!(url, error = %e, "apollo state unusable"),
        }
    }

    /// Tier 4.
    fn reveal_tier(&self, url: &str, surface: &mut dyn Surface, outcome: &mut ChainOutcome) {
        outcome.consulted(SourceTier::InteractiveReveal);
        match reveal_phone(surface, &self.plan) {
            Ok(number) => {
                let mut partial = Partial::default();
                partial.record.phone = Some(number);
                outcome.absorb(partial, SourceTier::InteractiveReveal);
            }
            Err(RevealError::NoControl) => debug!(url, "no contact control; phone left null"),
            Err(e) => warn!(url, error = %e, "phone reveal failed; phone left null"),
        }
    }
}

/// `props.pageProps.ad`, else the `Ad:<id>` container matching the URL's
/// listing id, else the first such container. Page-level data outside an ad
/// is never read as the listing.
pub fn ad_subtree<'a>(tree: &'a DataTree, url: &str) -> Option<&'a Value> {
    if let Some(ad) = value_at_path(tree, &["props", "pageProps", "ad"]) {
        if ad.as_object().is_some_and(|m| !m.is_empty()) {
            return Some(ad);
        }
    }

    let listing_id = LISTING_ID_RE.find_iter(url).last().map(|m| m.as_str());
    let mut first = None;
    for map in mappings(tree) {
        for (key, value) in map {
            let Some(caps) = AD_CONTAINER_RE.captures(key) else {
                continue;
            };
            if !value.is_object() {
                continue;
            }
            if listing_id == caps.get(1).map(|m| m.as_str()) {
                return Some(value);
            }
            first.get_or_insert(value);
        }
    }
    first
}

/// Text of `pageProps.scripts[name = classified_summary_info].content`.
fn summary_script(tree: &DataTree) -> Option<&str> {
    value_at_path(tree, &["props", "pageProps", "scripts"])?
        .as_array()?
        .iter()
        .find(|s| s.get("name").and_then(Value::as_str) == Some(SUMMARY_SCRIPT_NAME))?
        .get("content")?
        .as_str()
}

/// Only the `Ad:*` entries of an Apollo cache, so unrelated entities do not
/// contribute phone candidates.
fn apollo_ads(state: &DataTree) -> Value {
    let ads = state
        .as_object()
        .map(|m| {
            m.iter()
                .filter(|(k, _)| k.starts_with("Ad:"))
                .map(|(_, v)| v.clone())
                .collect()
        })
        .unwrap_or_default();
    Value::Array(ads)
}

// ── Tests ──
