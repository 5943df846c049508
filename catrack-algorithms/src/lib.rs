//! catrack-algorithms: Time-sliced, multi-threaded track finding.
//!
//! The pipeline of one timeslice:
//! - **Time gating** - feasible event time interval per hit, bogus hit rejection
//! - **Partitioning** - load-balanced, contiguous time ranges per thread
//! - **Sliding windows** - per-thread sub-window selection, kernel call and
//!   overlap-aware track storage
//! - **Merge** - per-thread results concatenated in thread order, with
//!   conflicting tracks of later threads dropped
//!
//! The track-finding algorithm itself is pluggable through [`TrackKernel`];
//! [`LineFollowKernel`] is a straight-line reference implementation.
//!
#![warn(missing_docs)]

mod finder;
mod kernel;
mod keys;
mod line_kernel;
mod partition;
mod time_info;
mod window;

pub use finder::{FindTracksOutput, FinderStats, TrackFinder};
pub use kernel::{KernelOutput, TrackKernel, WindowSelection};
pub use keys::HitKeyFlags;
pub use line_kernel::{LineFollowConfig, LineFollowKernel};
pub use partition::{Partition, WindowPartitioner, WindowRange};
pub use time_info::{HitTimeGate, HitTimeInfo, TimesliceTiming};
pub use window::ThreadStats;
