//! # Admission Control
//!
//! Caps simultaneous builds per resource. Excess requests are rejected,
//! never queued. A permit is released when dropped, so every exit path of
//! an execution gives its slot back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::errors::{AdmissionError, AdmissionResult};
use crate::observability::{Event, Logger, MetricsRegistry};

#[derive(Debug)]
pub struct AdmissionControl {
    default_limit: usize,
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl AdmissionControl {
    /// `default_limit` applies to resources without their own limit; it is
    /// clamped to at least one.
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit: default_limit.max(1),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Take a slot for `resource` if fewer than its limit are in use
    pub fn try_acquire(
        &self,
        resource: &str,
        limit: Option<usize>,
    ) -> AdmissionResult<AdmissionPermit> {
        let limit = limit.unwrap_or(self.default_limit).max(1);
        let mut in_flight = self.in_flight.lock().map_err(|_| AdmissionError::Poisoned)?;
        let count = in_flight.entry(resource.to_string()).or_insert(0);
        if *count >= limit {
            drop(in_flight);
            if let Some(metrics) = &self.metrics {
                metrics.increment_admission_rejections();
            }
            Logger::warn(
                Event::AdmissionRejected,
                &[("limit", &limit.to_string()), ("resource", resource)],
            );
            return Err(AdmissionError::TooManyRequests {
                resource: resource.to_string(),
                limit,
            });
        }
        *count += 1;
        Ok(AdmissionPermit {
            resource: resource.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    /// Slots currently held for `resource`
    pub fn in_flight(&self, resource: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .copied()
            .unwrap_or(0)
    }
}

/// One held admission slot
#[derive(Debug)]
pub struct AdmissionPermit {
    resource: String,
    in_flight: Arc<Mutex<HashMap<String, usize>>>,
}

impl AdmissionPermit {
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(count) = in_flight.get_mut(&self.resource) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                in_flight.remove(&self.resource);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_of_one() {
        let admission = AdmissionControl::new(1);
        let permit = admission.try_acquire("demo/data", None).unwrap();
        assert_eq!(permit.resource(), "demo/data");

        let err = admission.try_acquire("demo/data", None).unwrap_err();
        assert_eq!(
            err,
            AdmissionError::TooManyRequests {
                resource: "demo/data".into(),
                limit: 1
            }
        );
        assert_eq!(err.to_string(), "Too many concurrent requests");

        // Other resources are independent
        assert!(admission.try_acquire("demo/other", None).is_ok());

        drop(permit);
        assert_eq!(admission.in_flight("demo/data"), 0);
        assert!(admission.try_acquire("demo/data", None).is_ok());
    }

    #[test]
    fn test_resource_limit_overrides_default() {
        let admission = AdmissionControl::new(1);
        let _a = admission.try_acquire("r", Some(2)).unwrap();
        let _b = admission.try_acquire("r", Some(2)).unwrap();
        assert_eq!(admission.in_flight("r"), 2);
        assert!(admission.try_acquire("r", Some(2)).is_err());
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let admission = AdmissionControl::new(0);
        assert_eq!(admission.default_limit(), 1);
        let _held = admission.try_acquire("r", Some(0)).unwrap();
        assert!(admission.try_acquire("r", Some(0)).is_err());
    }

    #[test]
    fn test_rejections_counted() {
        let metrics = Arc::new(MetricsRegistry::new());
        let admission = AdmissionControl::new(1).with_metrics(Arc::clone(&metrics));
        let _held = admission.try_acquire("r", None).unwrap();
        let _ = admission.try_acquire("r", None);
        assert_eq!(metrics.snapshot().admission_rejections, 1);
    }
}
