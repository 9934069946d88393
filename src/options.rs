use core::fmt;
use core::str::FromStr;

/// Controls what a subscription delivers.  Follows the builder conventions used elsewhere in
/// this crate:
///
/// ```
/// use observe_stream::ObservingOptions;
///
/// let options = ObservingOptions::new().with_old().with_new();
/// assert!(options.old && options.new && !options.initial);
///
/// let parsed: ObservingOptions = "old, new".parse().unwrap();
/// assert_eq!(parsed, options);
/// ```
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObservingOptions {
    /// Include the value after the change.
    pub new: bool,

    /// Include the value before the change.
    pub old: bool,

    /// Deliver one notification with the current value immediately on subscription, before
    /// `subscribe` returns.
    pub initial: bool,

    /// Deliver an additional notification before each change (see
    /// [`crate::ObservedChange::is_prior`]).
    pub prior: bool,
}

impl ObservingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_new(mut self) -> Self {
        self.new = true;
        self
    }

    pub fn with_old(mut self) -> Self {
        self.old = true;
        self
    }

    pub fn with_initial(mut self) -> Self {
        self.initial = true;
        self
    }

    pub fn with_prior(mut self) -> Self {
        self.prior = true;
        self
    }
}

impl fmt::Display for ObservingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = [
            (self.new, "new"),
            (self.old, "old"),
            (self.initial, "initial"),
            (self.prior, "prior"),
        ];
        let names: Vec<_> = flags
            .iter()
            .filter(|(set, _)| *set)
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

/// Parses a comma separated list such as `"new,old,initial"`.  Whitespace around entries and
/// empty entries are ignored, so the empty string yields the default options.
impl FromStr for ObservingOptions {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut options = Self::new();
        for raw in s.split(',') {
            match raw.trim() {
                "" => {}
                "new" => options.new = true,
                "old" => options.old = true,
                "initial" => options.initial = true,
                "prior" => options.prior = true,
                other => return Err(InvalidOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown observing option: {0:?} (expected new, old, initial or prior)")]
pub struct InvalidOption(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all() {
        let options: ObservingOptions = " initial,prior , old,new".parse().unwrap();
        assert_eq!(
            options,
            ObservingOptions::new()
                .with_new()
                .with_old()
                .with_initial()
                .with_prior()
        );
    }

    #[test]
    fn test_parse_empty() {
        let options: ObservingOptions = "".parse().unwrap();
        assert_eq!(options, ObservingOptions::default());
    }

    #[test]
    fn test_parse_unknown() {
        let err = "new,bogus".parse::<ObservingOptions>().unwrap_err();
        assert_eq!(err, InvalidOption("bogus".to_string()));
    }

    #[test]
    fn test_display_round_trip() {
        let options = ObservingOptions::new().with_old().with_initial();
        assert_eq!(options.to_string(), "old,initial");
        assert_eq!(options.to_string().parse::<ObservingOptions>().unwrap(), options);
    }
}
