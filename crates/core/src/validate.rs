//! Local checks run before any network call.

use chrono::NaiveDate;

use crate::error::CoreError;

/// Project names must only contain ascii letters and digits and start with
/// an ascii letter.
pub fn is_valid_project_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    }
}

/// `label` names the argument in the error, e.g. "Project name".
pub fn check_project_name(label: &str, name: &str) -> Result<(), CoreError> {
    if is_valid_project_name(name) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{label} must only contain ascii letters and digits and start with an ascii letter"
        )))
    }
}

/// Parse a `yyyy-mm-dd` deadline that must not lie before `today`.
pub fn check_deadline(deadline: &str, today: NaiveDate) -> Result<NaiveDate, CoreError> {
    let date = parse_day(deadline)?;
    if date < today {
        return Err(CoreError::Validation(
            "Project deadline can not be earlier than today".to_string(),
        ));
    }
    Ok(date)
}

pub fn parse_day(day: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| CoreError::Validation(format!("invalid date '{day}' (expected yyyy-mm-dd): {e}")))
}
