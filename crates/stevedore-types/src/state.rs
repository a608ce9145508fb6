//! Pod- and manifest-level state names.
//!
//! Pod state is a superset of the container states: the aggregation fold
//! copies container states into the pod state verbatim, and the pod can
//! additionally be `warning` (mixed container states) or `destroy`
//! (removal tombstone written into a cache).

pub const EMPTY: &str = "";
pub const CREATED: &str = "created";
pub const RUNNING: &str = "running";
pub const STOPPED: &str = "stopped";
pub const EXITED: &str = "exited";
pub const ERROR: &str = "error";
pub const WARNING: &str = "warning";
pub const DESTROY: &str = "destroy";
