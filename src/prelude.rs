pub use crate::codec::{BitVector, Mode};
pub use crate::config::Config;
pub use crate::error::{MismatchEntry, TbError, TbResult};
pub use crate::executor::{JoinHandle, Task};
pub use crate::model::ArithOp;
pub use crate::scoreboard::{Scoreboard, Strictness};
pub use crate::signal::SimObject;
pub use crate::sim_if::{self, SimIf};
pub use crate::tb_obj::{StopToken, TbObj};
pub use crate::testbench::{clock, ArithTb, DividerTb};
pub use crate::trigger::Trigger;
pub use crate::utils::clock_cycles;
pub use crate::{fail_test, pass_test, test_case};
pub use futures::future::FutureExt;
