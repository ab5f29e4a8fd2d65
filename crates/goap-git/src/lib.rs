//! `goap-git` — everything in `gitgoap` that actually shells out to `git`.
//!
//! This crate has no knowledge of plans, goals, or the action registry; it
//! only knows how to invoke `git` safely ([`facade`]), decode its
//! machine-readable output ([`porcelain`]), scan working-copy conflict
//! markers ([`conflict`]), and preview a merge without touching the working
//! tree ([`mergetree`]). `gitgoap` composes these into an immutable
//! `RepoState` snapshot.

pub mod conflict;
pub mod error;
pub mod facade;
pub mod mergetree;
pub mod porcelain;

pub use error::FacadeError;
pub use facade::{CommandOutput, SubprocessFacade};
