use regex::{Captures, Regex};
use std::env;

use crate::ConfigError;

/// Interpolate environment variables in a string.
/// Replaces `${VAR_NAME}` with the value of the environment variable.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;

    let mut missing: Vec<String> = Vec::new();
    let result = re.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if !missing.is_empty() {
        return Err(ConfigError::MissingEnvVars(missing));
    }

    Ok(result.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_env() {
        env::set_var("FUSESHIM_TEST_A", "hello");
        env::set_var("FUSESHIM_TEST_B", "world");

        let input = "prefix ${FUSESHIM_TEST_A} middle ${FUSESHIM_TEST_B} suffix";
        assert_eq!(interpolate_env(input).unwrap(), "prefix hello middle world suffix");
    }

    #[test]
    fn test_interpolate_env_missing_reported_once() {
        let input = "${FUSESHIM_MISSING_1} ${FUSESHIM_MISSING_1} ${FUSESHIM_MISSING_2}";
        match interpolate_env(input) {
            Err(ConfigError::MissingEnvVars(vars)) => {
                assert_eq!(vars, vec!["FUSESHIM_MISSING_1", "FUSESHIM_MISSING_2"]);
            }
            other => panic!("Expected MissingEnvVars error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpolate_env_no_vars() {
        assert_eq!(interpolate_env("no variables here").unwrap(), "no variables here");
        assert_eq!(interpolate_env("").unwrap(), "");
    }

    #[test]
    fn test_interpolate_env_adjacent_vars() {
        env::set_var("FUSESHIM_ADJ_A", "mnt");
        env::set_var("FUSESHIM_ADJ_B", "data");
        assert_eq!(
            interpolate_env("/${FUSESHIM_ADJ_A}/${FUSESHIM_ADJ_B}").unwrap(),
            "/mnt/data"
        );
    }

    #[test]
    fn test_interpolate_env_partial_syntax_not_matched() {
        assert_eq!(
            interpolate_env("not a $VAR variable").unwrap(),
            "not a $VAR variable"
        );
        assert_eq!(
            interpolate_env("not a ${VAR variable").unwrap(),
            "not a ${VAR variable"
        );
    }

    #[test]
    fn test_interpolate_env_value_not_reexpanded() {
        env::set_var("FUSESHIM_LITERAL", "${FUSESHIM_NOT_SET_ANYWHERE}");
        assert_eq!(
            interpolate_env("${FUSESHIM_LITERAL}").unwrap(),
            "${FUSESHIM_NOT_SET_ANYWHERE}"
        );
    }
}
