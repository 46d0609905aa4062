//! Field checks shared by the request models.
//!
//! Each check returns [`Error::BadRequest`] naming the offending field.

use crate::errors::Error;

pub fn length(field: &str, value: &str, min: usize, max: usize) -> Result<(), Error> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::BadRequest {
            message: format!("{field} must be between {min} and {max} characters"),
        });
    }
    Ok(())
}

pub fn max_length(field: &str, value: &str, max: usize) -> Result<(), Error> {
    if value.chars().count() > max {
        return Err(Error::BadRequest {
            message: format!("{field} must be at most {max} characters"),
        });
    }
    Ok(())
}

pub fn range(field: &str, value: i32, min: i32, max: i32) -> Result<(), Error> {
    if !(min..=max).contains(&value) {
        return Err(Error::BadRequest {
            message: format!("{field} must be between {min} and {max}"),
        });
    }
    Ok(())
}

pub fn count(field: &str, len: usize, min: usize, max: usize) -> Result<(), Error> {
    if len < min || len > max {
        return Err(Error::BadRequest {
            message: format!("{field} must contain between {min} and {max} items"),
        });
    }
    Ok(())
}

/// Syntactic check only: one `@`, a non-empty local part and a dotted domain.
pub fn email(field: &str, value: &str) -> Result<(), Error> {
    let valid = value.len() <= 254
        && !value.chars().any(char::is_whitespace)
        && match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.split('.').count() >= 2
                    && domain.split('.').all(|label| !label.is_empty())
            }
            None => false,
        };

    if !valid {
        return Err(Error::BadRequest {
            message: format!("{field} must be a valid email address"),
        });
    }
    Ok(())
}
