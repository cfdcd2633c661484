// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `DOTNET_ROOT` propagation for sub-process runtimes.
//!
//! Bootstrapping a child runtime requires pointing it at the host's
//! runtime directory. The architecture-specific variants take precedence
//! over the plain variable in the child's probing logic, so whenever a
//! fresh `DOTNET_ROOT` is propagated they must be *unset* — a stale
//! `DOTNET_ROOT_X64` would silently win. Originals present in the
//! caller's environment are restored on teardown.

use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

/// The primary runtime-root variable.
pub const DOTNET_ROOT: &str = "DOTNET_ROOT";

/// Architecture-specific variants that override [`DOTNET_ROOT`].
pub const DOTNET_ROOT_ARCH_VARS: &[&str] =
    &["DOTNET_ROOT_X64", "DOTNET_ROOT_X86", "DOTNET_ROOT_ARM64"];

/// RAII guard over propagated runtime-root variables.
///
/// Construction snapshots the current values, sets the fresh root, and
/// clears the architecture variants; dropping the guard restores every
/// variable to its original state (set or unset).
#[derive(Debug)]
pub struct DotnetRootGuard {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl DotnetRootGuard {
    /// Propagates `root` as the child runtime root.
    #[must_use]
    pub fn propagate(root: &Path) -> Self {
        let mut saved = Vec::with_capacity(1 + DOTNET_ROOT_ARCH_VARS.len());
        saved.push((DOTNET_ROOT, std::env::var_os(DOTNET_ROOT)));
        for var in DOTNET_ROOT_ARCH_VARS {
            saved.push((var, std::env::var_os(var)));
        }
        debug!(root = %root.display(), "propagating runtime root");
        std::env::set_var(DOTNET_ROOT, root);
        for var in DOTNET_ROOT_ARCH_VARS {
            std::env::remove_var(var);
        }
        Self { saved }
    }
}

impl Drop for DotnetRootGuard {
    fn drop(&mut self) {
        for (var, original) in self.saved.drain(..) {
            match original {
                Some(value) => std::env::set_var(var, value),
                None => std::env::remove_var(var),
            }
        }
        debug!("restored runtime root environment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn propagate_sets_root_clears_arch_and_restores() {
        std::env::set_var(DOTNET_ROOT, "/original/root");
        std::env::set_var("DOTNET_ROOT_X64", "/original/x64");
        std::env::remove_var("DOTNET_ROOT_X86");
        std::env::remove_var("DOTNET_ROOT_ARM64");

        {
            let _guard = DotnetRootGuard::propagate(&PathBuf::from("/fresh/root"));
            assert_eq!(
                std::env::var(DOTNET_ROOT).as_deref(),
                Ok("/fresh/root")
            );
            // Arch variants must be unset while a fresh root is live.
            assert!(std::env::var_os("DOTNET_ROOT_X64").is_none());
            assert!(std::env::var_os("DOTNET_ROOT_X86").is_none());
        }

        assert_eq!(std::env::var(DOTNET_ROOT).as_deref(), Ok("/original/root"));
        assert_eq!(
            std::env::var("DOTNET_ROOT_X64").as_deref(),
            Ok("/original/x64")
        );
        assert!(std::env::var_os("DOTNET_ROOT_X86").is_none());

        std::env::remove_var(DOTNET_ROOT);
        std::env::remove_var("DOTNET_ROOT_X64");
    }
}
