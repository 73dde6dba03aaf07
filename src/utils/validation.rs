//! Validation utilities

use crate::types::*;

/// Validate that an account code is usable as a chart code
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if code.len() > 50 {
        return Err(LedgerError::Validation(
            "Account code cannot exceed 50 characters".to_string(),
        ));
    }

    if !code.chars().all(|c| c.is_alphanumeric()) {
        return Err(LedgerError::Validation(
            "Account code can only contain alphanumeric characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate that an entry designation is valid
pub fn validate_designation(designation: &str) -> LedgerResult<()> {
    if designation.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Designation cannot be empty".to_string(),
        ));
    }

    if designation.len() > 200 {
        return Err(LedgerError::Validation(
            "Designation cannot exceed 200 characters".to_string(),
        ));
    }

    Ok(())
}

/// Normalize an account code to the configured code size: trailing zeros
/// beyond the size are trimmed, short codes are zero-padded.
pub fn correct_accounting_code(code: &str, code_size: usize) -> String {
    let mut code = code.trim().to_string();
    while code.len() > code_size && code.ends_with('0') {
        code.pop();
    }
    while code.len() < code_size {
        code.push('0');
    }
    code
}
