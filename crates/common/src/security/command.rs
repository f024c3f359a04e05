//! Command-path validation
//!
//! The path handed to the executor is run directly, never through a shell,
//! but it still must not carry shell metacharacters, must be absolute and
//! must match the configured allow-listed command when one is set.

use crate::error::CommandValidationError;
use nix::unistd::{access, AccessFlags};
use path_clean::PathClean;
use std::path::{Path, PathBuf};

/// Shell metacharacters rejected anywhere in a command path
pub const DANGEROUS_CHARS: [char; 11] = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];

/// File-system checks performed after the lexical checks pass
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    pub check_exists: bool,
    /// Only consulted when `check_exists` is set
    pub check_executable: bool,
}

impl ValidationOptions {
    /// Existence and executability checks
    pub fn strict() -> Self {
        Self {
            check_exists: true,
            check_executable: true,
        }
    }

    /// Lexical checks only, no file-system access
    pub fn dry() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandPathValidator {
    allowed: Option<PathBuf>,
}

impl CommandPathValidator {
    pub fn new(allowed: Option<PathBuf>) -> Self {
        Self {
            allowed: allowed.map(|p| p.clean()),
        }
    }

    pub fn allowed_path(&self) -> Option<&Path> {
        self.allowed.as_deref()
    }

    /// Validate `path`, returning its lexically normalised absolute form.
    pub fn validate(
        &self,
        path: &str,
        options: ValidationOptions,
    ) -> Result<PathBuf, CommandValidationError> {
        if path.trim().is_empty() {
            return Err(CommandValidationError::EmptyPath);
        }

        // Must run before every other check.
        let found: Vec<char> = DANGEROUS_CHARS
            .iter()
            .copied()
            .filter(|c| path.contains(*c))
            .collect();
        if !found.is_empty() {
            return Err(CommandValidationError::InvalidCharacters {
                path: path.to_string(),
                chars: found,
            });
        }

        let raw = Path::new(path);
        if !raw.is_absolute() {
            return Err(CommandValidationError::RelativePath {
                path: path.to_string(),
            });
        }

        let normalized = raw.clean();

        if let Some(allowed) = &self.allowed {
            if &normalized != allowed {
                return Err(CommandValidationError::PathNotAllowed {
                    path: normalized,
                    allowed: allowed.clone(),
                });
            }
        }

        if options.check_exists {
            if !normalized.exists() {
                return Err(CommandValidationError::FileNotFound { path: normalized });
            }

            if options.check_executable && access(&normalized, AccessFlags::X_OK).is_err() {
                return Err(CommandValidationError::NotExecutable { path: normalized });
            }
        }

        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn validator() -> CommandPathValidator {
        CommandPathValidator::new(None)
    }

    #[test]
    fn test_rejects_empty_path() {
        let err = validator().validate("   ", ValidationOptions::dry()).unwrap_err();
        assert_eq!(err.kind(), "empty_path");
    }

    #[test]
    fn test_rejects_every_dangerous_char() {
        for c in DANGEROUS_CHARS {
            // Relative on purpose: the character check must win.
            let path = format!("bin/dev{}server", c);
            let err = validator().validate(&path, ValidationOptions::strict()).unwrap_err();
            assert_eq!(err.kind(), "invalid_characters", "char {:?}", c);
        }
    }

    #[test]
    fn test_reports_all_offending_chars() {
        let err = validator()
            .validate("/usr/bin/dev; rm -rf / | cat", ValidationOptions::dry())
            .unwrap_err();
        match err {
            CommandValidationError::InvalidCharacters { chars, .. } => {
                assert_eq!(chars, vec![';', '|']);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_relative_path_rejected_before_existence_check() {
        let err = validator()
            .validate("./scripts/dev.sh", ValidationOptions::strict())
            .unwrap_err();
        assert_eq!(err.kind(), "relative_path");
    }

    #[test]
    fn test_normalizes_dot_segments() {
        let path = validator()
            .validate("/opt/app/./scripts/../bin/dev", ValidationOptions::dry())
            .unwrap();
        assert_eq!(path, PathBuf::from("/opt/app/bin/dev"));
    }

    #[test]
    fn test_allow_list_compares_normalized_paths() {
        let v = CommandPathValidator::new(Some(PathBuf::from("/opt/app/bin/dev")));
        assert!(v
            .validate("/opt/app/scripts/../bin/dev", ValidationOptions::dry())
            .is_ok());

        let err = v.validate("/opt/app/bin/other", ValidationOptions::dry()).unwrap_err();
        assert_eq!(err.kind(), "path_not_allowed");
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.sh");
        let err = validator()
            .validate(path.to_str().unwrap(), ValidationOptions::strict())
            .unwrap_err();
        assert_eq!(err.kind(), "file_not_found");
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dev.sh");
        fs::write(&path, "#!/bin/sh\necho '{}'\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let err = validator()
            .validate(path.to_str().unwrap(), ValidationOptions::strict())
            .unwrap_err();
        assert_eq!(err.kind(), "not_executable");

        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        let ok = validator()
            .validate(path.to_str().unwrap(), ValidationOptions::strict())
            .unwrap();
        assert_eq!(ok, path);
    }
}
