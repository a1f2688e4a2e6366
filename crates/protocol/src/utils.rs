//! Config text helpers.

/// Replace every `${VAR}` in `input` with the value of the environment
/// variable `VAR`.
///
/// Unset variables expand to an empty string. An unterminated `${` is kept
/// verbatim.
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };
        if let Ok(value) = std::env::var(&tail[..end]) {
            result.push_str(&value);
        }
        rest = &tail[end + 1..];
    }

    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use super::expand_env_vars;

    #[test]
    fn passthrough_without_vars() {
        assert_eq!(expand_env_vars("bind = \"0.0.0.0:1234\""), "bind = \"0.0.0.0:1234\"");
    }

    #[test]
    fn unset_var_is_empty() {
        assert_eq!(expand_env_vars("a${DROVER_SURELY_UNSET_VAR}b"), "ab");
    }

    #[test]
    fn unterminated_kept() {
        assert_eq!(expand_env_vars("x ${OOPS"), "x ${OOPS");
    }
}
