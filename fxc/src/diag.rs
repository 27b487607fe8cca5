//! Append-only diagnostics buffer.
use fxc_core::Location;
use std::fmt::Write;

/// Collects formatted error and warning messages. Compilation succeeds iff
/// no error-severity entry was pushed.
#[derive(Default)]
pub struct Diagnostics {
    buffer: String,
    error_count: u32,
    warning_count: u32,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn error(&mut self, location: &Location, code: u32, message: &str) {
        self.error_count += 1;
        self.push("error", location, code, message);
    }
    pub fn warning(&mut self, location: &Location, code: u32, message: &str) {
        self.warning_count += 1;
        self.push("warning", location, code, message);
    }

    fn push(&mut self, severity: &str, location: &Location, code: u32, message: &str) {
        if code == 0 {
            let _ = writeln!(self.buffer, "{}: {}: {}", location, severity, message);
        } else {
            let _ = writeln!(
                self.buffer,
                "{}: {} X{}: {}",
                location, severity, code, message
            );
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
    pub fn error_count(&self) -> u32 {
        self.error_count
    }
    pub fn warning_count(&self) -> u32 {
        self.warning_count
    }
    pub fn as_str(&self) -> &str {
        &self.buffer
    }
    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format() {
        let mut diag = Diagnostics::new();
        let loc = Location::new("fx.fx", 3, 7);
        diag.error(&loc, 3004, "undeclared identifier 'foo'");
        diag.warning(&loc, 5000, "global variables are considered 'uniform' by default");
        assert_eq!(
            diag.as_str(),
            "fx.fx(3, 7): error X3004: undeclared identifier 'foo'\n\
             fx.fx(3, 7): warning X5000: global variables are considered 'uniform' by default\n"
        );
        assert!(diag.has_errors());
        assert_eq!(diag.warning_count(), 1);
    }

    #[test]
    fn test_unnumbered() {
        let mut diag = Diagnostics::new();
        diag.warning(&Location::new("fx.fx", 1, 1), 0, "unknown attribute");
        assert_eq!(diag.as_str(), "fx.fx(1, 1): warning: unknown attribute\n");
        assert!(!diag.has_errors());
    }
}
