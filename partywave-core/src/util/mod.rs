use chrono::Utc;

mod fields;
mod id;
mod locks;

pub use fields::*;
pub use id::*;
pub use locks::*;

/// Milliseconds since the unix epoch, the clock every room timestamp uses.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
