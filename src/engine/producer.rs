//! Blocking side of an execution
//!
//! Runs on a blocking thread: pulls rows from the source through the
//! stage chain into a formatter whose bytes go to the stream bridge, and
//! to the cache when this execution is building an entry.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::bridge::StreamBridge;
use crate::cache::{AdmissionPermit, BuildHandle};
use crate::format::Formatter;
use crate::observability::{Event, Logger, MetricsRegistry};
use crate::pipeline::{Chain, Flow, PipelineError, PipelineResult, RowSink, RowSource};
use crate::row::Row;

use super::errors::{EngineError, EngineResult};

/// Reports whether the response started or failed before its first byte
pub(crate) type StartSignal = oneshot::Sender<EngineResult<()>>;

/// Everything one execution owns
pub(crate) struct Production {
    pub path: String,
    pub source: Box<dyn RowSource>,
    pub chain: Chain,
    pub formatter: Formatter,
    pub output: Output,
    pub timeout: Option<Duration>,
    pub metrics: Arc<MetricsRegistry>,
    /// Held until the execution ends
    pub permit: Option<AdmissionPermit>,
}

/// Closes the source on every exit path
struct OpenSource(Box<dyn RowSource>);

impl Drop for OpenSource {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Cancellation and timeout checks made at each source read, each emitted
/// row and while parked on a full bridge
struct Deadline {
    at: Option<Instant>,
    timeout: Duration,
}

impl Deadline {
    fn new(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.map(|t| Instant::now() + t),
            timeout: timeout.unwrap_or_default(),
        }
    }

    fn expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Response byte sink: the bridge, plus the cache entry being built
pub(crate) struct Output {
    bridge: StreamBridge,
    build: Option<BuildHandle>,
    started: Option<StartSignal>,
    deadline: Deadline,
}

impl Output {
    pub fn new(bridge: StreamBridge, build: Option<BuildHandle>, started: StartSignal) -> Self {
        Self {
            bridge,
            build,
            started: Some(started),
            deadline: Deadline::new(None),
        }
    }

    /// Fails once the client is gone or the deadline has passed
    fn check(&self) -> EngineResult<()> {
        if self.bridge.is_closed() {
            return Err(EngineError::Cancelled);
        }
        if self.deadline.expired() {
            return Err(EngineError::Timeout(self.deadline.timeout));
        }
        Ok(())
    }

    /// The error to report for a failed run
    fn classify(&self, err: EngineError) -> EngineError {
        match self.check() {
            Err(interrupted) => interrupted,
            Ok(()) => err,
        }
    }

    fn signal_started(&mut self) {
        if self.bridge.dispatched() > 0 {
            if let Some(started) = self.started.take() {
                let _ = started.send(Ok(()));
            }
        }
    }

    /// Finish the stream and publish the cache entry
    fn complete(mut self) -> EngineResult<()> {
        let end = self.bridge.end();
        if end.is_err() {
            if let Some(build) = self.build.take() {
                build.fail("client disconnected");
            }
            return Err(EngineError::Cancelled);
        }
        if let Some(build) = self.build.take() {
            build.commit();
        }
        if let Some(started) = self.started.take() {
            let _ = started.send(Ok(()));
        }
        Ok(())
    }

    /// Report `err` cleanly if nothing was sent yet, otherwise truncate
    fn abort(mut self, path: &str, err: EngineError) {
        let reason = err.to_string();
        if let Some(build) = self.build.take() {
            build.fail(&reason);
        }
        match self.started.take() {
            Some(started) => {
                let _ = started.send(Err(err));
            }
            None => {
                if !matches!(err, EngineError::Cancelled) {
                    Logger::warn(
                        Event::StreamTruncated,
                        &[("path", path), ("reason", &reason)],
                    );
                }
                self.bridge.abort(&reason);
            }
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(build) = self.build.as_mut() {
            build.write(buf);
        }
        self.bridge.write(buf)?;
        // The consumer cannot start reading until it hears the response began
        self.signal_started();
        self.bridge.wait_for_drain_until(self.deadline.at)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formats every row that leaves the chain
struct FormatSink<'a> {
    formatter: &'a mut Formatter,
    output: &'a mut Output,
    rows: u64,
}

impl RowSink for FormatSink<'_> {
    fn on_row(&mut self, row: Row) -> PipelineResult<Flow> {
        if self.interrupted() {
            return Err(PipelineError::Cancelled);
        }
        self.formatter
            .row(&row, self.output)
            .map_err(|e| PipelineError::Output(e.to_string()))?;
        self.rows += 1;
        Ok(Flow::Continue)
    }

    fn interrupted(&self) -> bool {
        self.output.check().is_err()
    }
}

/// Run one execution to completion
pub(crate) fn produce(production: Production) {
    let Production {
        path,
        source,
        mut chain,
        mut formatter,
        mut output,
        timeout,
        metrics,
        permit,
    } = production;
    let started = Instant::now();
    let mut source = OpenSource(source);
    output.deadline = Deadline::new(timeout);

    let result = run(&mut source, &mut chain, &mut formatter, &mut output);
    // Spill files and the source go before the slot is released
    drop(chain);
    drop(source);

    // A failure after the client left or the deadline passed is reported as such
    let result = result.map_err(|err| output.classify(err));
    let elapsed = started.elapsed().as_millis().to_string();
    match result {
        Ok(rows) => match output.complete() {
            Ok(()) => {
                metrics.add_rows_emitted(rows);
                Logger::info(
                    Event::ExecutionComplete,
                    &[("elapsed_ms", &elapsed), ("path", &path), ("rows", &rows.to_string())],
                );
            }
            Err(err) => report_failure(&metrics, &path, &elapsed, &err),
        },
        Err(err) => {
            report_failure(&metrics, &path, &elapsed, &err);
            output.abort(&path, err);
        }
    }
    drop(permit);
}

fn report_failure(metrics: &MetricsRegistry, path: &str, elapsed: &str, err: &EngineError) {
    let reason = err.to_string();
    let fields = [("elapsed_ms", elapsed), ("path", path), ("reason", reason.as_str())];
    match err {
        EngineError::Cancelled => {
            metrics.increment_executions_cancelled();
            Logger::warn(Event::ExecutionCancelled, &fields);
        }
        // Reported with the request, which sees it before the first byte
        err if err.is_client_error() => {}
        _ => {
            metrics.increment_executions_failed();
            Logger::error(Event::ExecutionFailed, &fields);
        }
    }
}

fn run(
    source: &mut OpenSource,
    chain: &mut Chain,
    formatter: &mut Formatter,
    output: &mut Output,
) -> EngineResult<u64> {
    let source = &mut source.0;
    let schema = source.open()?;
    let schema = chain.on_start(schema)?;
    formatter
        .begin(&schema, output)
        .map_err(|e| EngineError::Output(e.to_string()))?;

    let mut sink = FormatSink {
        formatter: &mut *formatter,
        output: &mut *output,
        rows: 0,
    };
    loop {
        sink.output.check()?;
        if !source.has_next()? {
            break;
        }
        let row = source.next_row()?;
        if chain.on_row(row, &mut sink)? == Flow::Stop {
            break;
        }
    }
    chain.on_end(&mut sink)?;

    let rows = sink.rows;
    formatter
        .end(output)
        .map_err(|e| EngineError::Output(e.to_string()))?;
    Ok(rows)
}

/// Stream a stored cache entry through the bridge
pub(crate) fn replay(mut body: Box<dyn Read + Send>, mut bridge: StreamBridge, path: &str) {
    match io::copy(&mut body, &mut bridge) {
        Ok(_) => {
            let _ = bridge.end();
        }
        Err(_) if bridge.is_closed() => {}
        Err(e) => {
            Logger::warn(
                Event::StreamTruncated,
                &[("path", path), ("reason", &e.to_string())],
            );
            bridge.abort(&e.to_string());
        }
    }
}
