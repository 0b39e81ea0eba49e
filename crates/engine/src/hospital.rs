// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Flow hospital: supervision policy for errored flows.
//!
//! The engine publishes an errored flow and its recent history; the
//! hospital decides whether to retry from the last safe point, start error
//! propagation, park the flow, or kill it.

use async_trait::async_trait;
use parking_lot::Mutex;
use skein_core::{ErrorCause, FlowError, FlowId};
use std::collections::HashMap;

/// What the engine tells the hospital about an errored flow.
#[derive(Debug, Clone)]
pub struct HospitalReport {
    pub flow_id: FlowId,
    pub error: FlowError,
    /// How many times this flow has already been admitted.
    pub admissions: u32,
}

/// The hospital's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HospitalCommand {
    RetryFromSafePoint,
    StartErrorPropagation,
    Pause,
    Kill,
}

#[async_trait]
pub trait FlowHospital: Send + Sync {
    async fn admit(&self, report: HospitalReport) -> HospitalCommand;

    /// The flow left supervision (finished, removed, or recovered).
    fn discharge(&self, flow_id: &FlowId);
}

/// Default policy: bounded retries for internal faults, then propagate.
/// Hospitalize-forcing errors park the flow for an operator.
pub struct DefaultHospital {
    max_retries: u32,
    admissions: Mutex<HashMap<FlowId, u32>>,
}

impl DefaultHospital {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            admissions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl FlowHospital for DefaultHospital {
    async fn admit(&self, report: HospitalReport) -> HospitalCommand {
        let attempts = {
            let mut admissions = self.admissions.lock();
            let entry = admissions.entry(report.flow_id).or_insert(0);
            *entry += 1;
            *entry
        };

        let command = match &report.error.cause {
            ErrorCause::Hospitalize { .. } => HospitalCommand::Pause,
            ErrorCause::Internal { .. } if attempts <= self.max_retries => {
                HospitalCommand::RetryFromSafePoint
            }
            _ => HospitalCommand::StartErrorPropagation,
        };

        tracing::warn!(
            flow_id = %report.flow_id.short(),
            error = %report.error.error_id,
            attempts,
            ?command,
            "flow admitted to hospital"
        );
        command
    }

    fn discharge(&self, flow_id: &FlowId) {
        self.admissions.lock().remove(flow_id);
    }
}

#[cfg(test)]
#[path = "hospital_tests.rs"]
mod tests;
