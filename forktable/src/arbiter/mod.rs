//! Fork arbitration.
//!
//! - `registry`: the ring of forks and their holders (never exposed raw)
//! - `table`: the [`Arbiter`], the only way to take or return a pair
//! - `grant`: [`ForkGrant`], the held pair; returns to the table on drop

mod grant;
mod registry;
mod table;

pub use grant::ForkGrant;
pub use registry::{PhilosopherId, TableSnapshot};
pub use table::{Arbiter, ArbiterError};
