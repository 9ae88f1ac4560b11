use std::time::Duration;

use crate::domain::GenerationError;

pub(crate) const GLOBAL_TIMEOUT_VAR: &str = "SVGSMITH_LLM_TIMEOUT_SECS";
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Reads one variable. Unset is `None`; a value that is set but not valid
/// unicode is a configuration error, not a silent default.
pub(crate) fn string_var(name: &str) -> Result<Option<String>, GenerationError> {
    match std::env::var(name) {
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(GenerationError::invalid_request(format!(
            "{name} is set but is not valid unicode"
        ))),
    }
}

/// First set variable out of a fallback chain: the svgsmith-scoped name,
/// then the conventional provider names (`DEEPSEEK_API_KEY` and friends).
pub(crate) fn first_string_var(names: &[&str]) -> Result<Option<String>, GenerationError> {
    for name in names {
        if let Some(value) = string_var(name)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Resolves the request deadline for one provider. The provider-scoped
/// variable wins, then the pipeline-wide `SVGSMITH_LLM_TIMEOUT_SECS`,
/// then the built-in default.
pub(crate) fn request_timeout(provider_var: &str) -> Result<Duration, GenerationError> {
    for name in [provider_var, GLOBAL_TIMEOUT_VAR] {
        if let Some(raw) = string_var(name)? {
            return whole_seconds(name, &raw);
        }
    }
    Ok(DEFAULT_REQUEST_TIMEOUT)
}

fn whole_seconds(name: &str, raw: &str) -> Result<Duration, GenerationError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(GenerationError::invalid_request(format!(
            "{name} must be a whole number of seconds greater than zero"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::domain::GenerationError;

    use super::{DEFAULT_REQUEST_TIMEOUT, first_string_var, request_timeout, whole_seconds};

    #[test]
    fn whole_seconds_parses_trimmed_positive_values() {
        let timeout = whole_seconds("SVGSMITH_DEEPSEEK_TIMEOUT_SECS", " 12 ")
            .expect("positive whole seconds should parse");
        assert_eq!(timeout, Duration::from_secs(12));
    }

    #[test]
    fn whole_seconds_rejects_zero_fractions_and_garbage() {
        for raw in ["0", "-3", "1.5", "fast"] {
            let error = whole_seconds("SVGSMITH_GEMINI_TIMEOUT_SECS", raw)
                .expect_err("unusable timeout value should be rejected");
            assert!(matches!(
                error,
                GenerationError::InvalidRequest { message }
                    if message.contains("SVGSMITH_GEMINI_TIMEOUT_SECS")
            ));
        }
    }

    #[test]
    fn fallback_chain_yields_none_when_nothing_is_set() {
        let value = first_string_var(&[
            "SVGSMITH_ENV_TEST_UNSET_PRIMARY",
            "SVGSMITH_ENV_TEST_UNSET_SECONDARY",
        ])
        .expect("unset variables are not an error");
        assert!(value.is_none());
    }

    #[test]
    fn request_timeout_falls_back_to_the_default() {
        let timeout = request_timeout("SVGSMITH_ENV_TEST_UNSET_TIMEOUT_SECS")
            .expect("an unset timeout chain resolves to the default");
        assert_eq!(timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
