use crate::error::TbResult;
use crate::signal::SimObject;

pub async fn clock_cycles(signal: SimObject, n_cycles: u32) -> TbResult {
    for _ in 0..n_cycles {
        signal.rising_edge().await;
    }
    Ok(())
}

/// Seed for one scenario, derived from the run seed and the scenario name so
/// that scenarios draw independent sequences that still reproduce.
pub fn scenario_seed(base: u64, suite: &str, test: &str) -> u64 {
    // FNV-1a
    let mut h: u64 = 0xcbf2_9ce4_8422_2325 ^ base;
    for b in suite.bytes().chain([b':']).chain(test.bytes()) {
        h ^= b as u64;
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_depend_on_everything() {
        let s = scenario_seed(1, "signed_adder", "basic_test");
        assert_eq!(s, scenario_seed(1, "signed_adder", "basic_test"));
        assert_ne!(s, scenario_seed(2, "signed_adder", "basic_test"));
        assert_ne!(s, scenario_seed(1, "unsigned_adder", "basic_test"));
        assert_ne!(s, scenario_seed(1, "signed_adder", "gr_test"));
    }
}
