use once_cell::sync::OnceCell;
use std::cell::RefCell;
use std::env;
use std::path::PathBuf;

use crate::error::{TbError, TbResult};

static CONFIG: OnceCell<Config> = OnceCell::new();

// Configuration of the scenario running on this thread.
thread_local! {
    static ACTIVE: RefCell<Option<Config>> = RefCell::new(None);
}

pub const DEFAULT_MAX_SIM_NS: u64 = 1_000_000;

/// Run-wide settings. Read from the environment, then overridden from the
/// command line before the first scenario runs.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Base seed; every scenario derives its generators from it.
    pub seed: u64,
    /// Comma separated `suite::test` or `test` names. Empty runs everything.
    pub testcase: Vec<String>,
    pub work_dir: PathBuf,
    pub results: PathBuf,
    /// External flow graph program. `None` uses the in-process engine.
    pub engine_cmd: Option<String>,
    /// Hard ceiling for a single scenario.
    pub max_sim_ns: u64,
    pub verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: 0,
            testcase: Vec::new(),
            work_dir: env::temp_dir().join("dsptb"),
            results: PathBuf::from("results.xml"),
            engine_cmd: None,
            max_sim_ns: DEFAULT_MAX_SIM_NS,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_env() -> TbResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TbResult<Self> {
        let mut cfg = Config {
            seed: seed_from_clock(),
            ..Config::default()
        };
        if let Some(seed) = lookup("RANDOM_SEED") {
            cfg.seed = parse_num("RANDOM_SEED", &seed)?;
        }
        if let Some(tc) = lookup("TESTCASE") {
            cfg.testcase = split_names(&tc);
        }
        if let Some(dir) = lookup("DSPTB_WORK_DIR") {
            cfg.work_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("DSPTB_RESULTS") {
            cfg.results = PathBuf::from(path);
        }
        cfg.engine_cmd = lookup("DSPTB_ENGINE_CMD").filter(|c| !c.trim().is_empty());
        if let Some(ns) = lookup("DSPTB_MAX_SIM_NS") {
            cfg.max_sim_ns = parse_num("DSPTB_MAX_SIM_NS", &ns)?;
        }
        if let Some(v) = lookup("DSPTB_VERBOSE") {
            cfg.verbose = matches!(v.as_str(), "1" | "true" | "yes");
        }
        Ok(cfg)
    }

    /// Makes `self` the run-wide configuration. Only the first call wins.
    pub fn install(self) -> &'static Config {
        CONFIG.get_or_init(|| self)
    }

    /// The installed configuration, or the defaults when nothing was
    /// installed (unit tests).
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Config::default)
    }

    /// Runs `f` with the configuration of the scenario running on this
    /// thread, falling back to [`Config::global`] between scenarios.
    pub fn with_current<R>(f: impl FnOnce(&Config) -> R) -> R {
        ACTIVE.with(|a| match a.borrow().as_ref() {
            Some(cfg) => f(cfg),
            None => f(Config::global()),
        })
    }

    /// Owned copy of the running scenario's configuration.
    pub fn current() -> Config {
        Self::with_current(Config::clone)
    }

    pub(crate) fn set_active(cfg: Option<Config>) {
        ACTIVE.with(|a| *a.borrow_mut() = cfg);
    }

    /// Whether the scenario `suite::test` was selected.
    pub fn selects(&self, suite: &str, test: &str) -> bool {
        if self.testcase.is_empty() {
            return true;
        }
        let full = format!("{}::{}", suite, test);
        self.testcase
            .iter()
            .any(|sel| sel == test || sel == suite || *sel == full)
    }
}

fn split_names(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from)
        .collect()
}

fn parse_num(key: &str, value: &str) -> TbResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| TbError::Failed(format!("{}: '{}' is not a number", key, value)))
}

fn seed_from_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
