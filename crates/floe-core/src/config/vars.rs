//! Environment variable interpolation for job configuration files.
//!
//! Supported syntax:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset (empty is OK)
//! - `$$` - escape sequence for literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escaped dollar
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # 1: braced name
            (?:
                (:?-)                  # 2: default operator
                ([^}]*)                # 3: default value
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # 4: bare name
        ",
    )
    .expect("Invalid regex pattern")
});

/// Result of environment variable interpolation.
#[derive(Debug)]
pub struct InterpolationResult {
    /// The interpolated text.
    pub text: String,
    /// Every variable that could not be resolved, in order of appearance.
    pub errors: Vec<String>,
}

impl InterpolationResult {
    /// Returns true if there were no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Interpolate environment variables in the given text.
///
/// Errors are accumulated rather than short-circuited so that a config with
/// several missing variables reports all of them at once. Unresolved
/// references are left verbatim in the output text.
pub fn interpolate(input: &str) -> InterpolationResult {
    let mut errors = Vec::new();
    let text = ENV_VAR_PATTERN
        .replace_all(input, |caps: &Captures| resolve(caps, &mut errors))
        .into_owned();

    InterpolationResult { text, errors }
}

fn resolve(caps: &Captures, errors: &mut Vec<String>) -> String {
    let whole = &caps[0];
    if whole == "$$" {
        return "$".to_string();
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let operator = caps.get(2).map(|m| m.as_str());
    let fallback = caps.get(3).map(|m| m.as_str());

    match env::var(name) {
        Ok(value) if value.contains(['\n', '\r']) => {
            errors.push(format!(
                "environment variable '{name}' contains newlines, which is not allowed"
            ));
            whole.to_string()
        }
        Ok(value) if value.is_empty() && operator == Some(":-") => {
            fallback.unwrap_or_default().to_string()
        }
        Ok(value) => value,
        Err(_) => match fallback {
            Some(default) => default.to_string(),
            None => {
                errors.push(format!("environment variable '{name}' is not set"));
                whole.to_string()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names and restores them afterwards
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the state captured above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        with_env_vars(&[("FLOE_TEST_BUCKET", Some("lake"))], || {
            let result = interpolate("output_root: s3://$FLOE_TEST_BUCKET/${FLOE_TEST_BUCKET}");
            assert!(result.is_ok());
            assert_eq!(result.text, "output_root: s3://lake/lake");
        });
    }

    #[test]
    fn test_missing_variables_are_all_reported() {
        with_env_vars(
            &[("FLOE_TEST_MISSING_A", None), ("FLOE_TEST_MISSING_B", None)],
            || {
                let result = interpolate("a: $FLOE_TEST_MISSING_A\nb: ${FLOE_TEST_MISSING_B}");
                assert_eq!(result.errors.len(), 2);
                assert!(result.errors[0].contains("FLOE_TEST_MISSING_A"));
                assert!(result.errors[1].contains("not set"));
                assert!(result.text.contains("$FLOE_TEST_MISSING_A"));
            },
        );
    }

    #[test]
    fn test_default_when_unset() {
        with_env_vars(&[("FLOE_TEST_UNSET", None)], || {
            let result = interpolate("section: ${FLOE_TEST_UNSET:-AWS}");
            assert!(result.is_ok());
            assert_eq!(result.text, "section: AWS");
        });
    }

    #[test]
    fn test_empty_value_respects_operator() {
        with_env_vars(&[("FLOE_TEST_EMPTY", Some(""))], || {
            assert_eq!(interpolate("${FLOE_TEST_EMPTY:-fallback}").text, "fallback");
            assert_eq!(interpolate("${FLOE_TEST_EMPTY-fallback}").text, "");
        });
    }

    #[test]
    fn test_newline_values_are_rejected() {
        with_env_vars(&[("FLOE_TEST_NEWLINE", Some("a\nb: c"))], || {
            let result = interpolate("key: $FLOE_TEST_NEWLINE");
            assert!(!result.is_ok());
            assert!(result.errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_escape_sequence() {
        let result = interpolate("secret: pa$$word");
        assert!(result.is_ok());
        assert_eq!(result.text, "secret: pa$word");
    }
}
