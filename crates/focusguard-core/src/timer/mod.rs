mod clock;
mod session_clock;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub(crate) use clock::ms_to_datetime;
pub use session_clock::{ClockTick, SessionClock};
