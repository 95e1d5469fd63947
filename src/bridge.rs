//! Hands recorded vectors to a streaming engine through binary interchange
//! files and checks that engine, simulation and model agree bit for bit.
//!
//! Interchange files are flat little endian `f32` samples without header or
//! length prefix.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::codec::BitVector;
use crate::config::Config;
use crate::engine::{self, Engine, GraphSpec};
use crate::error::{TbError, TbResult};
use crate::model::ArithOp;
use crate::sim_if;
use crate::stimulus::StimulusPair;

// File names are fixed, so only one check may touch a work directory at a
// time.
static BRIDGE_LOCK: Mutex<()> = Mutex::new(());

const SAMPLE_BYTES: usize = 4;

pub fn write_vector(path: &Path, samples: &[f32]) -> TbResult {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    fs::write(path, bytes).map_err(|e| TbError::io(path, e))
}

/// Every sample in the file.
pub fn read_all(path: &Path) -> TbResult<Vec<f32>> {
    let bytes = fs::read(path).map_err(|e| TbError::io(path, e))?;
    if bytes.len() % SAMPLE_BYTES != 0 {
        return Err(TbError::Invocation {
            stage: "read back".to_string(),
            reason: format!(
                "{}: {} bytes is not a whole number of samples",
                path.display(),
                bytes.len()
            ),
        });
    }
    Ok(bytes
        .chunks_exact(SAMPLE_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// The first `count` samples. A missing or short file means the engine did
/// not do its job.
pub fn read_vector(path: &Path, count: usize) -> TbResult<Vec<f32>> {
    let invocation = |reason: String| TbError::Invocation {
        stage: "read back".to_string(),
        reason,
    };
    let mut samples = read_all(path).map_err(|e| match e {
        TbError::Io { path, reason } => invocation(format!("{}: {}", path.display(), reason)),
        other => other,
    })?;
    if samples.len() < count {
        return Err(invocation(format!(
            "{}: expected {} samples, found {}",
            path.display(),
            count,
            samples.len()
        )));
    }
    samples.truncate(count);
    Ok(samples)
}

/// Paths of the interchange files for one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct InterchangeFiles {
    pub a: PathBuf,
    pub b: PathBuf,
    pub out: PathBuf,
}

impl InterchangeFiles {
    pub fn new(dir: &Path, op: ArithOp) -> Self {
        Self {
            a: dir.join("data_a.bin"),
            b: dir.join("data_b.bin"),
            out: dir.join(format!("data_{}.bin", op.result_name())),
        }
    }
}

/// Checks simulation results against a streaming engine.
pub struct Bridge {
    engine: Box<dyn Engine>,
    work_dir: PathBuf,
    samp_rate: u32,
}

impl Bridge {
    pub fn new(engine: Box<dyn Engine>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            work_dir: work_dir.into(),
            samp_rate: engine::DEFAULT_SAMP_RATE,
        }
    }

    pub fn from_config(cfg: &Config) -> TbResult<Self> {
        Ok(Self::new(
            engine::from_config(cfg.engine_cmd.as_deref())?,
            &cfg.work_dir,
        ))
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn graph(&self, op: ArithOp) -> GraphSpec {
        GraphSpec {
            samp_rate: self.samp_rate,
            ..GraphSpec::in_dir(&self.work_dir, op)
        }
    }

    /// Writes the inputs, runs the engine once and compares its output with
    /// `sim_out` and with the model. Returns the engine output.
    pub fn check(&self, op: ArithOp, a: &[f32], b: &[f32], sim_out: &[f32]) -> TbResult<Vec<f32>> {
        if a.len() != b.len() || a.len() != sim_out.len() {
            return Err(TbError::Failed(format!(
                "vector lengths differ: a={}, b={}, out={}",
                a.len(),
                b.len(),
                sim_out.len()
            )));
        }
        let _guard = lock();
        fs::create_dir_all(&self.work_dir).map_err(|e| TbError::io(&self.work_dir, e))?;
        let graph = self.graph(op);
        write_vector(&graph.source_a, a)?;
        write_vector(&graph.source_b, b)?;
        // a stale sink from an earlier run must not pass for this one
        if graph.sink.exists() {
            fs::remove_file(&graph.sink).map_err(|e| TbError::io(&graph.sink, e))?;
        }
        sim_if::log(&format!(
            "running {} over {} samples in {}",
            self.engine.name(),
            a.len(),
            self.work_dir.display()
        ));
        self.engine.run_graph(&graph)?;
        let engine_out = read_vector(&graph.sink, a.len())?;
        compare_all(op, a, b, sim_out, &engine_out)?;
        Ok(engine_out)
    }

    /// Compares files written by an earlier `check` without running the
    /// engine again.
    pub fn verify_files(&self, op: ArithOp, count: usize, sim_out: &[f32]) -> TbResult {
        let _guard = lock();
        let files = InterchangeFiles::new(&self.work_dir, op);
        let a = read_vector(&files.a, count)?;
        let b = read_vector(&files.b, count)?;
        let engine_out = read_vector(&files.out, count)?;
        if sim_out.len() != count {
            return Err(TbError::Failed(format!(
                "expected {} simulation samples, got {}",
                count,
                sim_out.len()
            )));
        }
        compare_all(op, &a, &b, sim_out, &engine_out)
    }
}

fn lock() -> std::sync::MutexGuard<'static, ()> {
    match BRIDGE_LOCK.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn compare_all(op: ArithOp, a: &[f32], b: &[f32], sim_out: &[f32], engine_out: &[f32]) -> TbResult {
    compare("engine", engine_out, "simulation", sim_out)?;
    let model: Vec<f32> = a.iter().zip(b).map(|(&x, &y)| op.apply_f32(x, y)).collect();
    compare("engine", engine_out, "model", &model)
}

fn compare(left: &'static str, lv: &[f32], right: &'static str, rv: &[f32]) -> TbResult {
    match lv.iter().zip(rv).position(|(l, r)| l != r) {
        Some(index) => Err(TbError::CrossEngineMismatch {
            left,
            right,
            index,
            left_value: lv[index],
            right_value: rv[index],
        }),
        None => Ok(()),
    }
}

/// The vectors of one run, ready to be written out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterchangeVectors {
    pub a: Vec<f32>,
    pub b: Vec<f32>,
    pub out: Vec<f32>,
}

/// Collects what a driver applied and what a monitor saw on the output.
#[derive(Debug, Clone)]
pub struct VectorRecorder {
    op: ArithOp,
    latency: usize,
    skipped: usize,
    pairs: Vec<StimulusPair>,
    outputs: Vec<BitVector>,
}

impl VectorRecorder {
    /// The first `latency` output samples belong to no recorded pair and are
    /// dropped.
    pub fn new(op: ArithOp, latency: usize) -> Self {
        Self {
            op,
            latency,
            skipped: 0,
            pairs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record_pair(&mut self, pair: StimulusPair) {
        self.pairs.push(pair);
    }

    pub fn record_output(&mut self, sample: BitVector) {
        if self.skipped < self.latency {
            self.skipped += 1;
            return;
        }
        self.outputs.push(sample);
    }

    pub fn len(&self) -> usize {
        self.pairs.len().min(self.outputs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete pairs with their outputs. Each output is decoded signed only
    /// when the model result for its pair is negative.
    pub fn vectors(&self) -> TbResult<InterchangeVectors> {
        let mut v = InterchangeVectors::default();
        for (&(x, y), out) in self.pairs.iter().zip(&self.outputs) {
            let mode = crate::codec::Mode::for_result(self.op.apply(x, y));
            v.a.push(x as f32);
            v.b.push(y as f32);
            v.out.push(out.reinterpret(mode)?.to_int() as f32);
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Mode;
    use crate::engine::InProcessEngine;

    struct Corrupting;

    impl Engine for Corrupting {
        fn name(&self) -> &str {
            "corrupting"
        }
        fn run_graph(&self, graph: &GraphSpec) -> TbResult {
            InProcessEngine.run_graph(graph)?;
            let mut out = read_all(&graph.sink)?;
            out[1] += 1.0;
            write_vector(&graph.sink, &out)
        }
    }

    struct Silent;

    impl Engine for Silent {
        fn name(&self) -> &str {
            "silent"
        }
        fn run_graph(&self, _graph: &GraphSpec) -> TbResult {
            Ok(())
        }
    }

    #[test]
    fn sum_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(Box::new(InProcessEngine), dir.path());
        let out = bridge
            .check(ArithOp::Add, &[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[5.0, 7.0, 9.0])
            .unwrap();
        assert_eq!(out, vec![5.0, 7.0, 9.0]);
        assert_eq!(
            read_all(&dir.path().join("data_sum.bin")).unwrap(),
            vec![5.0, 7.0, 9.0]
        );
    }

    #[test]
    fn verify_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(Box::new(InProcessEngine), dir.path());
        let sim = [-5.0, 0.0, 12.0];
        bridge
            .check(ArithOp::Add, &[10.0, 0.0, 7.0], &[-15.0, 0.0, 5.0], &sim)
            .unwrap();
        bridge.verify_files(ArithOp::Add, 3, &sim).unwrap();
        bridge.verify_files(ArithOp::Add, 3, &sim).unwrap();
    }

    #[test]
    fn engine_disagreement_names_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(Box::new(Corrupting), dir.path());
        let err = bridge
            .check(ArithOp::Multiply, &[1.0, 2.0], &[3.0, 4.0], &[3.0, 8.0])
            .unwrap_err();
        assert_eq!(
            err,
            TbError::CrossEngineMismatch {
                left: "engine",
                right: "simulation",
                index: 1,
                left_value: 9.0,
                right_value: 8.0,
            }
        );
    }

    #[test]
    fn simulation_disagreement_is_caught() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(Box::new(InProcessEngine), dir.path());
        let err = bridge
            .check(ArithOp::Add, &[1.0], &[1.0], &[3.0])
            .unwrap_err();
        assert_eq!(err.kind(), "CrossEngineMismatchError");
    }

    #[test]
    fn missing_output_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::new(Box::new(Silent), dir.path());
        let err = bridge.check(ArithOp::Add, &[1.0], &[2.0], &[3.0]).unwrap_err();
        assert_eq!(err.kind(), "InvocationError");
    }

    #[test]
    fn short_file_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data_a.bin");
        write_vector(&path, &[1.0, 2.0]).unwrap();
        assert_eq!(read_vector(&path, 2).unwrap(), vec![1.0, 2.0]);
        assert_eq!(read_vector(&path, 3).unwrap_err().kind(), "InvocationError");
        fs::write(&path, [0u8; 5]).unwrap();
        assert_eq!(read_all(&path).unwrap_err().kind(), "InvocationError");
    }

    #[test]
    fn files_are_little_endian_f32() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.bin");
        write_vector(&path, &[1.0]).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0x00, 0x00, 0x80, 0x3f]);
    }

    #[test]
    fn recorder_aligns_and_decodes_per_sample() {
        let mut rec = VectorRecorder::new(ArithOp::Add, 1);
        // reset value seen before the first pair reached the output
        rec.record_output(BitVector::from_raw(0, 9, Mode::Signed).unwrap());
        rec.record_pair((10, -15));
        rec.record_pair((100, 100));
        rec.record_output(BitVector::from_int(-5, 9, Mode::Signed).unwrap());
        rec.record_output(BitVector::from_int(200, 9, Mode::Unsigned).unwrap());
        assert_eq!(
            rec.vectors().unwrap(),
            InterchangeVectors {
                a: vec![10.0, 100.0],
                b: vec![-15.0, 100.0],
                out: vec![-5.0, 200.0],
            }
        );
    }
}
