mod clock;
mod driver;
mod engine;
mod mode;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{TimerDriver, AUTO_START_DELAY, TICK_INTERVAL};
pub use engine::{completion, SessionTimer, TimerState};
pub use mode::TimerMode;
