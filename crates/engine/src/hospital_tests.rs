// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn internal_report(flow_id: FlowId) -> HospitalReport {
    HospitalReport {
        flow_id,
        error: FlowError::fresh(ErrorCause::Internal {
            message: "db down".into(),
        }),
        admissions: 0,
    }
}

#[tokio::test]
async fn internal_errors_retry_until_the_bound() {
    let hospital = DefaultHospital::new(2);
    let flow = FlowId::fresh();

    assert_eq!(
        hospital.admit(internal_report(flow)).await,
        HospitalCommand::RetryFromSafePoint
    );
    assert_eq!(
        hospital.admit(internal_report(flow)).await,
        HospitalCommand::RetryFromSafePoint
    );
    // Third admission exceeds the bound
    assert_eq!(
        hospital.admit(internal_report(flow)).await,
        HospitalCommand::StartErrorPropagation
    );
}

#[tokio::test]
async fn hospitalize_cause_parks_the_flow() {
    let hospital = DefaultHospital::new(3);
    let report = HospitalReport {
        flow_id: FlowId::fresh(),
        error: FlowError::fresh(ErrorCause::Hospitalize {
            message: "needs operator".into(),
        }),
        admissions: 0,
    };
    assert_eq!(hospital.admit(report).await, HospitalCommand::Pause);
}

#[tokio::test]
async fn discharge_resets_the_retry_budget() {
    let hospital = DefaultHospital::new(1);
    let flow = FlowId::fresh();

    assert_eq!(
        hospital.admit(internal_report(flow)).await,
        HospitalCommand::RetryFromSafePoint
    );
    hospital.discharge(&flow);
    assert_eq!(
        hospital.admit(internal_report(flow)).await,
        HospitalCommand::RetryFromSafePoint
    );
}

#[tokio::test]
async fn admission_counters_are_per_flow() {
    let hospital = DefaultHospital::new(1);
    let a = FlowId::fresh();
    let b = FlowId::fresh();

    assert_eq!(
        hospital.admit(internal_report(a)).await,
        HospitalCommand::RetryFromSafePoint
    );
    assert_eq!(
        hospital.admit(internal_report(a)).await,
        HospitalCommand::StartErrorPropagation
    );
    // A fresh flow still gets its retry
    assert_eq!(
        hospital.admit(internal_report(b)).await,
        HospitalCommand::RetryFromSafePoint
    );
}
