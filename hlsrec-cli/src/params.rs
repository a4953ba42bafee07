use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::error::AppError;

/// Parses `key=value` query parameters, splitting at the first `=`.
pub fn parse_params(params: &[String]) -> Result<Vec<(String, String)>, AppError> {
    params
        .iter()
        .map(|param| {
            let (key, value) = param
                .split_once('=')
                .ok_or_else(|| AppError::InvalidInput(format!("Invalid param format: {param}")))?;
            if key.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Invalid param format: {param}"
                )));
            }
            debug!("Added parameter: key='{key}', value='{value}'");
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parses `Name: value` headers into `headers`, replacing existing values.
pub fn parse_headers(raw: &[String], headers: &mut HeaderMap) -> Result<(), AppError> {
    for header in raw {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| AppError::InvalidInput(format!("Invalid header format: {header}")))?;

        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| AppError::InvalidInput(format!("Invalid header name in '{header}': {e}")))?;
        let value = HeaderValue::from_str(value.trim()).map_err(|e| {
            AppError::InvalidInput(format!("Invalid header value in '{header}': {e}"))
        })?;

        debug!("Added header: {}", name);
        headers.insert(name, value);
    }
    Ok(())
}
