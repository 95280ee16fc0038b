//! Run one shell command across a fleet of remote servers.
//!
//! # The host registry
//!
//! Hosts are declared in a plain text registry, one host per line:
//!
//! ```text
//! # ADDRESS              ALIAS [ALIAS...]  [(OPTION[,OPTION...])]
//! okusi0.example.com     ok0 okusi          (oknav)
//! okusi1.example.com     ok1                (oknav,exclude)
//! build.example.com      build              (oknav,local-only:workstation)
//! ```
//!
//! The first alias on a line is the address's *primary* alias. Only primary aliases tagged
//! `oknav` (and not tagged `exclude`) take part in fleet runs.
//!
//! # Program flow
//!
//! 1. [Registry::load] finds and parses the registry. After that the [Registry] is read-only.
//!
//! 2. [fleet::select] derives the ordered list of fleet members, minus any runtime excludes.
//!
//! 3. [Engine::run] executes the command on every member, sequentially or concurrently, and hands
//!    each [ExecutionResult] to a [Report] implementation in fleet order. A [Resolver] turns each
//!    member into an address at run time, so a local-only violation shows up as a per-host failure
//!    rather than a missing host.
//!
//! [Engine::run]: engine::Engine::run
//! [ExecutionResult]: engine::ExecutionResult
//! [Report]: engine::report::Report

pub mod config;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod links;
pub mod list;
pub mod registry;
pub mod resolve;

#[doc(inline)]
pub use engine::Engine;

#[doc(inline)]
pub use error::{Error, ResolveError};

#[doc(inline)]
pub use registry::Registry;

#[doc(inline)]
pub use resolve::Resolver;
