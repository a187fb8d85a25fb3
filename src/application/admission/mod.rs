//! Admission use case: multi-scope quota checks for inbound requests.

mod controller;

pub use controller::{
    AdmissionController, AdmissionMetrics, AdmissionMetricsSnapshot, AdmissionRequest,
    UNKNOWN_CLIENT,
};
