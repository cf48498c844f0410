//! ObservationScope for begin/complete/failed logging around one unit of work
//!
//! - `{name}_BEGIN` on creation
//! - `{name}_COMPLETE` with `elapsed_ms` on [`ObservationScope::complete`]
//! - `{name}_FAILED` on [`ObservationScope::fail`]
//! - `{name}_INCOMPLETE` warning if dropped without either

use std::time::Instant;

use super::logger::{Logger, Severity};

pub struct ObservationScope {
    name: &'static str,
    fields: Vec<(&'static str, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(name: &'static str) -> Self {
        Self::with_fields(name, Vec::new())
    }

    /// Fields given here are repeated on every line the scope writes
    pub fn with_fields(name: &'static str, fields: Vec<(&'static str, String)>) -> Self {
        let scope = Self {
            name,
            fields,
            started: Instant::now(),
            finished: false,
        };
        scope.emit(Severity::Info, "BEGIN", &[]);
        scope
    }

    pub fn complete(mut self, extra: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut fields = extra.to_vec();
        fields.push(("elapsed_ms", &elapsed));
        self.emit(Severity::Info, "COMPLETE", &fields);
    }

    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        self.emit(
            Severity::Error,
            "FAILED",
            &[("reason", reason), ("elapsed_ms", &elapsed)],
        );
    }

    pub fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }

    fn emit(&self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        let event = format!("{}_{}", self.name, suffix);
        let mut fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fields.extend_from_slice(extra);
        Logger::log(severity, &event, &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete() {
        let scope = ObservationScope::with_fields("QUERY", vec![("path", "a/b".to_string())]);
        scope.complete(&[("rows", "3")]);
    }

    #[test]
    fn test_fail() {
        ObservationScope::new("QUERY").fail("source error");
    }

    #[test]
    fn test_drop_without_complete() {
        let scope = ObservationScope::new("QUERY");
        drop(scope);
    }

    #[test]
    fn test_elapsed_is_numeric() {
        let scope = ObservationScope::new("QUERY");
        let ms: u128 = scope.elapsed_ms().parse().unwrap();
        assert!(ms < 60_000);
        scope.complete(&[]);
    }
}
