//! Streaming engines that run the reference flow graph
//! `file source -> throttle -> add/multiply -> file sink` over interchange
//! files.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::bridge;
use crate::error::{TbError, TbResult};
use crate::model::ArithOp;

pub const DEFAULT_SAMP_RATE: u32 = 32_000;

/// One run of the flow graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSpec {
    pub op: ArithOp,
    pub samp_rate: u32,
    pub source_a: PathBuf,
    pub source_b: PathBuf,
    pub sink: PathBuf,
}

impl GraphSpec {
    /// The graph over the fixed interchange file names in `dir`.
    pub fn in_dir(dir: &Path, op: ArithOp) -> Self {
        let files = bridge::InterchangeFiles::new(dir, op);
        Self {
            op,
            samp_rate: DEFAULT_SAMP_RATE,
            source_a: files.a,
            source_b: files.b,
            sink: files.out,
        }
    }
}

/// Runs a flow graph to completion. Blocks until the sink file is complete.
pub trait Engine: Send {
    fn name(&self) -> &str;
    fn run_graph(&self, graph: &GraphSpec) -> TbResult;
}

/// A block produces one sample per call until its input runs dry.
trait Block {
    fn work(&mut self) -> TbResult<Option<f32>>;
}

struct FileSource {
    samples: std::vec::IntoIter<f32>,
}

impl FileSource {
    fn open(path: &Path) -> TbResult<Self> {
        let samples = bridge::read_all(path).map_err(|e| TbError::Invocation {
            stage: "file source".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            samples: samples.into_iter(),
        })
    }
}

impl Block for FileSource {
    fn work(&mut self) -> TbResult<Option<f32>> {
        Ok(self.samples.next())
    }
}

/// Limits the sample rate of the stream passing through.
struct Throttle<B> {
    input: B,
    period: Option<Duration>,
    start: Instant,
    passed: u32,
}

impl<B: Block> Throttle<B> {
    fn new(input: B, samp_rate: u32) -> Self {
        let period = (samp_rate > 0).then(|| Duration::from_secs_f64(1.0 / samp_rate as f64));
        Self {
            input,
            period,
            start: Instant::now(),
            passed: 0,
        }
    }
}

impl<B: Block> Block for Throttle<B> {
    fn work(&mut self) -> TbResult<Option<f32>> {
        let sample = self.input.work()?;
        if let (Some(_), Some(period)) = (sample, self.period) {
            let due = self.start + period * self.passed;
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
            self.passed += 1;
        }
        Ok(sample)
    }
}

struct BinaryOp<A, B> {
    a: A,
    b: B,
    op: ArithOp,
}

impl<A: Block, B: Block> Block for BinaryOp<A, B> {
    fn work(&mut self) -> TbResult<Option<f32>> {
        // ends with the shorter input
        match (self.a.work()?, self.b.work()?) {
            (Some(x), Some(y)) => Ok(Some(self.op.apply_f32(x, y))),
            _ => Ok(None),
        }
    }
}

/// The flow graph evaluated in this process.
#[derive(Debug, Default, Clone)]
pub struct InProcessEngine;

impl Engine for InProcessEngine {
    fn name(&self) -> &str {
        "in-process"
    }

    fn run_graph(&self, graph: &GraphSpec) -> TbResult {
        let mut head = BinaryOp {
            a: Throttle::new(FileSource::open(&graph.source_a)?, graph.samp_rate),
            b: Throttle::new(FileSource::open(&graph.source_b)?, graph.samp_rate),
            op: graph.op,
        };
        let mut out = Vec::new();
        while let Some(sample) = head.work()? {
            out.push(sample);
        }
        bridge::write_vector(&graph.sink, &out).map_err(|e| TbError::Invocation {
            stage: "file sink".to_string(),
            reason: e.to_string(),
        })
    }
}

/// Launches an external flow graph program in the directory of the sink. The
/// program finds its files by their fixed names; the operation and sample
/// rate are passed in `DSPTB_OP` and `DSPTB_SAMP_RATE`.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: String,
    args: Vec<String>,
}

impl ProcessEngine {
    /// `cmd` is split on whitespace into program and arguments.
    pub fn from_command(cmd: &str) -> TbResult<Self> {
        let mut parts = cmd.split_whitespace().map(String::from);
        let program = parts.next().ok_or_else(|| TbError::Invocation {
            stage: "configure".to_string(),
            reason: "empty engine command".to_string(),
        })?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl Engine for ProcessEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn run_graph(&self, graph: &GraphSpec) -> TbResult {
        let dir = graph
            .sink
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&dir)
            .env("DSPTB_OP", graph.op.result_name())
            .env("DSPTB_SAMP_RATE", graph.samp_rate.to_string())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| TbError::Invocation {
                stage: "spawn".to_string(),
                reason: format!("{}: {}", self.program, e),
            })?;
        if !output.status.success() {
            return Err(TbError::Invocation {
                stage: "run".to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

/// The engine selected by configuration.
pub fn from_config(engine_cmd: Option<&str>) -> TbResult<Box<dyn Engine>> {
    match engine_cmd {
        Some(cmd) => Ok(Box::new(ProcessEngine::from_command(cmd)?)),
        None => Ok(Box::new(InProcessEngine)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_process_graph_multiplies() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphSpec::in_dir(dir.path(), ArithOp::Multiply);
        bridge::write_vector(&graph.source_a, &[1.0, -2.0, 3.0]).unwrap();
        bridge::write_vector(&graph.source_b, &[4.0, 5.0]).unwrap();
        InProcessEngine.run_graph(&graph).unwrap();
        assert!(graph.sink.ends_with("data_prod.bin"));
        assert_eq!(bridge::read_all(&graph.sink).unwrap(), vec![4.0, -10.0]);
    }

    #[test]
    fn missing_source_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphSpec::in_dir(dir.path(), ArithOp::Add);
        let err = InProcessEngine.run_graph(&graph).unwrap_err();
        assert_eq!(err.kind(), "InvocationError");
    }

    #[test]
    fn unknown_program_fails_to_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let graph = GraphSpec::in_dir(dir.path(), ArithOp::Add);
        let engine = ProcessEngine::from_command("dsptb-no-such-flowgraph --flag").unwrap();
        match engine.run_graph(&graph) {
            Err(TbError::Invocation { stage, .. }) => assert_eq!(stage, "spawn"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ProcessEngine::from_command("  ").is_err());
    }
}
