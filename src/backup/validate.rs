//! Validation functions for configuration values.
//!
//! Provides custom validation functions for the backup base path and the
//! segments that make up remote object keys.

use validator::ValidationError;

use std::path::Path;

pub fn validate_dir_exist<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if dir.exists() {
        if !dir.is_dir() {
            return Err(ValidationError::new("InvalidDirectory")
                .with_message(format!("{:?} is not a directory", dir).into()));
        }
    } else {
        return Err(ValidationError::new("InvalidDirectory")
            .with_message(format!("{:?} not found", dir).into()));
    }

    Ok(())
}

pub fn validate_absolute_dir<P: AsRef<Path>>(dir: P) -> Result<(), ValidationError> {
    let dir = dir.as_ref();
    if !dir.is_absolute() {
        return Err(ValidationError::new("RelativePath")
            .with_message(format!("{:?} must be an absolute path", dir).into()));
    }

    validate_dir_exist(dir)
}

/// Key segments are joined with `/`, so they must not start or end with one.
pub fn validate_key_segment<S: AsRef<str>>(segment: S) -> Result<(), ValidationError> {
    let segment = segment.as_ref();
    if segment.is_empty() {
        return Err(ValidationError::new("InvalidKeySegment")
            .with_message("key segment must not be empty".into()));
    }

    if segment.starts_with('/') || segment.ends_with('/') {
        return Err(ValidationError::new("InvalidKeySegment").with_message(
            format!("{:?} must not start or end with '/'", segment).into(),
        ));
    }

    Ok(())
}
