use smol_str::SmolStr;

/// SIP request methods the recording client sends or receives.
///
/// A recording dialog only ever carries INVITE, ACK, BYE, CANCEL and
/// OPTIONS; anything else arriving from the wire is preserved as
/// [`Method::Unknown`] so it can be answered with 405.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Unknown(SmolStr),
}

impl Method {
    /// Returns the canonical uppercase string representation for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Options => "OPTIONS",
            Method::Unknown(token) => token.as_str(),
        }
    }

    /// Parses a method token, returning Unknown for anything else.
    pub fn from_token(token: &str) -> Self {
        if token.eq_ignore_ascii_case("INVITE") {
            Method::Invite
        } else if token.eq_ignore_ascii_case("ACK") {
            Method::Ack
        } else if token.eq_ignore_ascii_case("BYE") {
            Method::Bye
        } else if token.eq_ignore_ascii_case("CANCEL") {
            Method::Cancel
        } else if token.eq_ignore_ascii_case("OPTIONS") {
            Method::Options
        } else {
            Method::Unknown(SmolStr::new(token.to_owned()))
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_methods() {
        for token in ["INVITE", "ACK", "BYE", "CANCEL", "OPTIONS"] {
            let method = Method::from_token(token);
            assert_eq!(method.as_str(), token);
            assert!(!matches!(method, Method::Unknown(_)));
        }
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!(Method::from_token("invite"), Method::Invite);
        assert_eq!(Method::from_token("Bye"), Method::Bye);
    }

    #[test]
    fn extension_methods_are_preserved() {
        let method = Method::from_token("SUBSCRIBE");
        assert_eq!(method, Method::Unknown(SmolStr::new("SUBSCRIBE")));
        assert_eq!(method.as_str(), "SUBSCRIBE");
    }
}
