//! Minimal liveness probe and the provider-availability probe used by the
//! `probe` CLI subcommand (SPEC_FULL.md §3). The synchronous HTTP OCR endpoint
//! and a public provider-availability HTTP API are explicitly out of scope
//! (spec.md §1); this stays a process-internal helper.

use std::sync::Arc;

use crate::config::Config;
use crate::drivers::OcrDriver;
use crate::models::Tier;
use crate::tier_policy::ActiveTiers;

pub struct ProbeReport {
    pub configured_tiers: Vec<Tier>,
    pub active_tiers: Vec<Tier>,
}

impl ProbeReport {
    pub fn print(&self) {
        println!("configured tiers: {:?}", self.configured_tiers.iter().map(Tier::as_str).collect::<Vec<_>>());
        println!("active tiers:     {:?}", self.active_tiers.iter().map(Tier::as_str).collect::<Vec<_>>());
        if self.active_tiers.is_empty() {
            println!("WARNING: no active tiers on this host");
        }
    }
}

pub async fn probe(config: &Config, all_drivers: Vec<Arc<dyn OcrDriver>>) -> anyhow::Result<ProbeReport> {
    let active = ActiveTiers::resolve(&config.ocr_enabled_tiers, all_drivers).await?;
    Ok(ProbeReport {
        configured_tiers: config.ocr_enabled_tiers.clone(),
        active_tiers: active.drivers.iter().map(|d| d.tier()).collect(),
    })
}
