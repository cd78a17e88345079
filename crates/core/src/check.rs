//! Contract checks for programmer errors.
//!
//! A failed check is a bug in the calling code, not a runtime condition:
//! it is logged at `error` level and halts debug builds. Release builds
//! log and carry on, so every check evaluates to the tested `bool` and the
//! caller decides how to bail out.

/// Checks a programmer-contract condition.
///
/// Evaluates to `true` when the condition holds. On failure the message
/// is logged through `tracing::error!` under the `cobalt::check` target,
/// then `debug_assert!` aborts debug builds.
///
/// # Example
///
/// ```
/// fn bind(slot: usize) {
///     if !cobalt_core::check!(slot < 4, "binding slot {} out of range", slot) {
///         return;
///     }
///     // ...
/// }
/// bind(1);
/// ```
#[macro_export]
macro_rules! check {
    ($cond:expr $(,)?) => {
        $crate::check!($cond, "check failed: {}", stringify!($cond))
    };
    ($cond:expr, $($arg:tt)+) => {{
        let passed: bool = $cond;
        if !passed {
            $crate::__private::tracing::error!(target: "cobalt::check", $($arg)+);
            debug_assert!(passed, $($arg)+);
        }
        passed
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_passing_check_returns_true() {
        let value = 3;
        assert!(crate::check!(value == 3));
        assert!(crate::check!(value > 1, "value {} too small", value));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "slot 9 out of range")]
    fn test_failing_check_panics_in_debug() {
        let slot = 9;
        crate::check!(slot < 4, "slot {} out of range", slot);
    }
}
