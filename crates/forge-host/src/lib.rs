// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! forge-host: host-boundary contracts for the Forge engine.
//!
//! Everything here touches the process environment or the file system —
//! the surfaces the core deliberately never reaches: `DOTNET_ROOT`
//! propagation for bootstrapping sub-process runtimes, SDK resolver
//! discovery, and the on-disk result-cache layout.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::multiple_crate_versions
)]

mod cache_dir;
mod env;
mod sdk;

/// Result-cache directory layout.
pub use cache_dir::{result_cache_path, result_cache_root};
/// `DOTNET_ROOT` propagation with teardown restore.
pub use env::{DotnetRootGuard, DOTNET_ROOT, DOTNET_ROOT_ARCH_VARS};
/// SDK resolver discovery.
pub use sdk::{find_resolvers, DiscoveryError, SdkResolverLocation};
