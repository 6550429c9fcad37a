pub mod notification;
pub mod recurrence;
pub mod schedule;

pub use notification::*;
pub use recurrence::*;
pub use schedule::*;
