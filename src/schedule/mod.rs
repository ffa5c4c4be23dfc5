pub mod cadence;
pub mod countdown;
pub mod expiry;
