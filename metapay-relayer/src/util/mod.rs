//! Process-level helpers for the relayer binary.

mod sig_down;

pub use sig_down::SigDown;
