use futures::future::BoxFuture;

use crate::dut::Circuit;
use crate::error::TbResult;
use crate::signal::SimObject;

pub type TestFn = fn(SimObject) -> BoxFuture<'static, TbResult>;

/// A registered scenario and, once it ran, its outcome.
pub struct Test {
    pub name: String,
    pub generator: TestFn,
    /// Simulated time budget.
    pub timeout: Option<(u64, &'static str)>,
    pub skip: bool,
    /// `Ok` carries the pass message.
    pub result: Option<TbResult<String>>,
    pub time_secs: f64,
    pub sim_time_ns: f64,
}

impl Test {
    pub fn new(name: &str, generator: TestFn) -> Self {
        Self {
            name: name.to_string(),
            generator,
            timeout: None,
            skip: false,
            result: None,
            time_secs: 0.0,
            sim_time_ns: 0.0,
        }
    }

    pub fn timeout(mut self, time: u64, unit: &'static str) -> Self {
        self.timeout = Some((time, unit));
        self
    }

    pub fn skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    pub fn set_result(&mut self, result: TbResult<String>) {
        self.result = Some(result);
    }

    pub fn passed(&self) -> bool {
        matches!(self.result, Some(Ok(_)))
    }
}

impl std::fmt::Debug for Test {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Test")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("skip", &self.skip)
            .field("result", &self.result)
            .finish()
    }
}

/// All scenarios for one circuit. Every scenario gets a fresh instance.
pub struct TestSuite {
    pub name: String,
    pub dut: fn() -> Box<dyn Circuit>,
    pub tests: Vec<Test>,
}

impl TestSuite {
    pub fn new(name: &str, dut: fn() -> Box<dyn Circuit>) -> Self {
        Self {
            name: name.to_string(),
            dut,
            tests: Vec::new(),
        }
    }

    pub fn test(mut self, test: Test) -> Self {
        self.tests.push(test);
        self
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Test> {
        self.tests.iter()
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Test> {
        self.tests.iter_mut().find(|t| t.name == name)
    }
}

/// Wraps an `async fn(SimObject) -> TbResult` into a [`Test`] named after it.
#[macro_export]
macro_rules! test_case {
    ($test:ident) => {
        $crate::test::Test::new(stringify!($test), |dut| {
            use $crate::prelude::FutureExt;
            $test(dut).boxed()
        })
    };
}
