//! Config / Tier Policy (§4.8): the active tier list is the configured
//! `OCR_ENABLED_TIERS`, filtered by host driver availability, in configured order.

use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::drivers::OcrDriver;
use crate::models::Tier;

pub struct ActiveTiers {
    /// Parallel to the active tier list, in cascade order.
    pub drivers: Vec<Arc<dyn OcrDriver>>,
}

impl ActiveTiers {
    /// Probes every configured driver's availability once at startup and keeps
    /// only those present in `enabled_tiers`, platform-gated, and reported
    /// available. Startup-fatal if the result is empty.
    pub async fn resolve(
        enabled_tiers: &[Tier],
        all_drivers: Vec<Arc<dyn OcrDriver>>,
    ) -> Result<Self> {
        let mut by_tier: std::collections::HashMap<Tier, Arc<dyn OcrDriver>> =
            std::collections::HashMap::new();
        for d in all_drivers {
            by_tier.insert(d.tier(), d);
        }

        let mut drivers = Vec::new();
        for tier in enabled_tiers {
            if tier.is_platform_gated() && !tier.platform_available() {
                info!(tier = tier.as_str(), "dropping platform-gated tier on this host");
                continue;
            }
            match by_tier.get(tier) {
                Some(driver) => {
                    if driver.is_available().await {
                        drivers.push(driver.clone());
                    } else {
                        warn!(tier = tier.as_str(), "driver reports unavailable, dropping from active list");
                    }
                }
                None => warn!(tier = tier.as_str(), "no driver registered for configured tier"),
            }
        }

        if drivers.is_empty() {
            bail!("active tier list is empty after availability probing — refusing to start");
        }

        info!(
            active_tiers = ?drivers.iter().map(|d| d.tier().as_str()).collect::<Vec<_>>(),
            "active tier list resolved"
        );

        Ok(ActiveTiers { drivers })
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<dyn OcrDriver>> {
        self.drivers.get(index)
    }
}
