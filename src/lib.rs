//! `corestack`: a cooperative user-space thread runtime, a small family of
//! stackable RAID block devices, and a FUSE-style file system mounted on
//! top of them.
//!
//! The three pieces are independent of each other at compile time — `qt`
//! doesn't know about `bd`/`raid`/`fs` — but are meant to be used together:
//! a server built on [`qt::Runtime`] mounts an [`fs::FileSystem`] over a
//! [`raid::Stripe4`] of [`bd::file::FileBlockDevice`]s, and every blocking
//! point in that stack (disk I/O aside, which is synchronous by design —
//! see `bd`) goes through `qt`'s cooperative suspension points rather than
//! real OS blocking.
//!
//! See `DESIGN.md` for how each module is grounded and why its dependency
//! choices were made.

pub mod bd;
pub mod errors;
pub mod fs;
pub mod qt;
pub mod raid;

pub use errors::{AsErrorKind, ErrorKind};
