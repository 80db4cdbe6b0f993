mod monitor;

pub use monitor::{
    FailReason, ShieldConfig, ShieldEvent, ShieldState, SoftShieldMonitor, Visibility,
    GRACE_WINDOW_SECS,
};
