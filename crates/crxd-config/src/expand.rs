//! Environment variable expansion for configuration strings.

use super::ConfigError;

/// Expand `${VAR}` and `${VAR:-default}` references in `value`.
///
/// `field` names the config key for error messages. Strings without `${`
/// are returned as is, so a bare `$VAR` in command argv reaches the shell.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| -> Result<Option<String>, LookupError> {
        match std::env::var(var) {
            Ok(val) => Ok(Some(val)),
            Err(_) => Err(LookupError {
                var_name: var.to_owned(),
            }),
        }
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{0}}} not set", e.cause.var_name),
    })
}

/// Failed lookup of a braced variable.
struct LookupError {
    var_name: String,
}

/// Expand every element of an argv-style list.
pub(crate) fn expand_env_all(values: &mut [String], field: &str) -> Result<(), ConfigError> {
    for value in values.iter_mut() {
        *value = expand_env(value, field)?;
    }
    Ok(())
}
