//! Conversion funnel recorder
//!
//! Records step occurrences per named funnel. Order is not validated: the
//! same step may appear twice or out of the intended sequence, and
//! interpretation is left to whoever reads the export.

use chrono::{DateTime, Utc};

use crate::types::{FunnelMap, FunnelState, FunnelStepData, FunnelStepRecord, Payload};

#[derive(Debug, Clone, Default)]
pub struct FunnelTracker {
    funnels: FunnelMap,
}

impl FunnelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, creating the funnel on first use.
    ///
    /// Returns the payload of the "funnel_step" event the collector emits.
    pub fn record(
        &mut self,
        funnel: &str,
        step: &str,
        data: Payload,
        now: DateTime<Utc>,
    ) -> FunnelStepData {
        let state = self
            .funnels
            .entry(funnel.to_string())
            .or_insert_with(|| FunnelState {
                steps: Vec::new(),
                start_time: now,
            });

        state.steps.push(FunnelStepRecord {
            step: step.to_string(),
            timestamp: now,
            data: data.clone(),
        });

        FunnelStepData {
            funnel: funnel.to_string(),
            step: step.to_string(),
            data,
        }
    }

    pub fn get(&self, funnel: &str) -> Option<&FunnelState> {
        self.funnels.get(funnel)
    }

    pub fn funnels(&self) -> &FunnelMap {
        &self.funnels
    }

    pub fn len(&self) -> usize {
        self.funnels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funnels.is_empty()
    }
}
