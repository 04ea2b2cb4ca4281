// tests/common/mod.rs
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ferry::logger::{LoggerRegistry, TerminalLogger};
use ferry::runner::{RunnerResult, SpawnedWorker, WorkerLaunch, WorkerProcess, WorkerSpawner};
use ferry::terminal::{Severity, TerminalSink};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;

/// A sink that keeps every write.
#[derive(Default)]
pub struct RecordingSink {
    writes: Mutex<Vec<(String, Severity)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn writes(&self) -> Vec<(String, Severity)> {
        self.writes.lock().unwrap().clone()
    }

    /// Everything written, concatenated.
    pub fn text(&self) -> String {
        self.writes().into_iter().map(|(text, _)| text).collect()
    }
}

impl TerminalSink for RecordingSink {
    fn supports_color(&self) -> bool {
        false
    }

    fn line_ending(&self) -> &str {
        "\n"
    }

    fn write(&self, text: &str, severity: Severity) {
        self.writes.lock().unwrap().push((text.to_string(), severity));
    }
}

pub type RecordedLogger = (Arc<TerminalLogger>, Arc<RecordingSink>);

/// A session with one recording logger per name.
pub fn session_with(names: &[&str]) -> (Arc<LoggerRegistry>, Vec<RecordedLogger>) {
    let registry = Arc::new(LoggerRegistry::new());
    let mut loggers = Vec::new();
    for name in names {
        let sink = RecordingSink::new();
        let logger = Arc::new(TerminalLogger::new(*name, sink.clone()));
        registry.register(logger.clone());
        loggers.push((logger, sink));
    }
    (registry, loggers)
}

/// A worker that writes fixed frames, then terminates with a fixed code.
///
/// Whatever the supervisor sends is ignored.
pub struct ScriptedSpawner {
    frames: Vec<String>,
    code: Option<i32>,
    launches: Mutex<Vec<WorkerLaunch>>,
}

impl ScriptedSpawner {
    pub fn new(frames: &[&str], code: Option<i32>) -> Arc<Self> {
        Arc::new(Self {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            code,
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> Vec<WorkerLaunch> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerSpawner for ScriptedSpawner {
    async fn spawn(&self, launch: &WorkerLaunch) -> RunnerResult<SpawnedWorker> {
        self.launches.lock().unwrap().push(launch.clone());

        let (supervisor_end, mut worker_end) = tokio::io::duplex(64 * 1024);
        let frames = self.frames.clone();
        let code = self.code;
        let handle = tokio::spawn(async move {
            for frame in frames {
                let line = format!("{}\n", frame);
                if worker_end.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
            code
        });

        let (reader, writer) = tokio::io::split(supervisor_end);
        Ok(SpawnedWorker {
            reader: Box::new(reader),
            writer: Box::new(writer),
            process: Box::new(ScriptedProcess { handle }),
        })
    }
}

struct ScriptedProcess {
    handle: JoinHandle<Option<i32>>,
}

#[async_trait]
impl WorkerProcess for ScriptedProcess {
    async fn wait(&mut self) -> RunnerResult<Option<i32>> {
        Ok((&mut self.handle).await.ok().flatten())
    }

    fn kill(&mut self) {
        self.handle.abort();
    }
}
