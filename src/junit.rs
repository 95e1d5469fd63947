use junit_report::{Duration, ReportBuilder, TestCase, TestCaseBuilder, TestSuiteBuilder};
use std::path::Path;

use crate::error::{TbError, TbResult};
use crate::test::TestSuite;

/// One junit test suite per circuit. Scenarios that did not run are left out.
pub(crate) fn create_junit_xml(suites: &[TestSuite], path: &Path) -> TbResult {
    let mut report = ReportBuilder::new();
    for suite in suites {
        let test_cases: Vec<TestCase> = suite
            .iter()
            .filter_map(|t| {
                let duration = Duration::seconds_f64(t.time_secs);
                let tc = match t.result.as_ref()? {
                    Ok(_) => TestCaseBuilder::success(&t.name, duration),
                    Err(e @ TbError::Timeout { .. }) => {
                        TestCaseBuilder::error(&t.name, duration, e.kind(), &e.to_string())
                    }
                    Err(e) => TestCaseBuilder::failure(&t.name, duration, e.kind(), &e.to_string()),
                };
                Some(tc.build())
            })
            .collect();
        if test_cases.is_empty() {
            continue;
        }
        report.add_testsuite(
            TestSuiteBuilder::new(&suite.name)
                .add_testcases(test_cases)
                .build(),
        );
    }
    let file = std::fs::File::create(path).map_err(|e| TbError::io(path, e))?;
    report.build().write_xml(file).map_err(|e| TbError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
