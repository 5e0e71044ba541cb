//! Line-oriented header rewriting in raw HTTP messages.
//!
//! Messages are handled as `\n`-separated lines and are always reassembled with a `\n`
//! after every line, including the last one. A `\r` ending a rewritten line is kept.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Header line prefix of the authorization header.
pub const AUTHORIZATION: &str = "Authorization:";

/// Header line prefix of the cookie header.
pub const COOKIE: &str = "Cookie:";

/// Replaces every line starting with `prefix` by `prefix value`.
///
/// The match is literal and case-sensitive, anchored at the start of the line.
///
/// ```rust
/// use recorrelate_core::rewrite_line;
///
/// let request = "GET / HTTP/1.1\nAuthorization: Bearer old\n";
/// assert_eq!(
///     rewrite_line(request, "Authorization:", "Bearer new"),
///     "GET / HTTP/1.1\nAuthorization: Bearer new\n"
/// );
/// ```
pub fn rewrite_line(body: &str, prefix: &str, value: &str) -> String {
    let mut out = String::with_capacity(body.len() + value.len() + 1);
    for line in lines(body) {
        if line.starts_with(prefix) {
            out.push_str(prefix);
            out.push(' ');
            out.push_str(value);
            if line.ends_with('\r') {
                out.push('\r');
            }
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Removes every line starting with one of `prefixes`, keeping the others in order.
pub fn strip_lines(body: &str, prefixes: &[&str]) -> String {
    let mut out = String::with_capacity(body.len() + 1);
    let kept = lines(body).filter(|line| !prefixes.iter().any(|prefix| line.starts_with(prefix)));
    for line in kept {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Lines of a message; a final `\n` does not open an extra empty line, an empty message is
/// one empty line.
fn lines(body: &str) -> std::str::Split<'_, char> {
    body.strip_suffix('\n').unwrap_or(body).split('\n')
}

/// Secure wrapper for credential values that zeroes memory on drop.
///
/// Credentials are redacted in `Debug` and masked in `Display`.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Creates a new secure string from the provided value.
    pub fn new(value: String) -> Self {
        Self(value)
    }

    /// Returns a reference to the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn mask_sensitive(value: &str) -> String {
        let count = value.chars().count();
        if count <= 8 {
            return "***".to_string();
        }
        let head: String = value.chars().take(4).collect();
        let tail: String = value.chars().skip(count - 4).collect();
        format!("{head}...{tail}")
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureString")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::mask_sensitive(&self.0))
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

/// A credential header handled by [`CredentialPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum CredentialHeader {
    /// `Authorization:`
    #[display("Authorization:")]
    Authorization,
    /// `Cookie:`
    #[display("Cookie:")]
    Cookie,
}

impl CredentialHeader {
    /// The line prefix of the header.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Authorization => AUTHORIZATION,
            Self::Cookie => COOKIE,
        }
    }
}

/// What to do with credential headers of correlated requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialPolicy {
    /// Leave credential headers as captured.
    #[default]
    Preserve,
    /// Replace both the authorization and the cookie header.
    InjectBoth {
        /// New `Authorization:` value.
        authorization: SecureString,
        /// New `Cookie:` value.
        cookie: SecureString,
    },
    /// Replace a single credential header, leaving the other as captured.
    InjectOne {
        /// The header to replace.
        header: CredentialHeader,
        /// Its new value.
        value: SecureString,
    },
    /// Remove both credential headers.
    StripAll,
}

impl CredentialPolicy {
    /// Builds the policy for optional authorization and cookie values.
    ///
    /// `omit` wins over any value; no value at all preserves the captured headers.
    pub fn from_values(
        authorization: Option<SecureString>,
        cookie: Option<SecureString>,
        omit: bool,
    ) -> Self {
        if omit {
            return Self::StripAll;
        }
        match (authorization, cookie) {
            (Some(authorization), Some(cookie)) => Self::InjectBoth {
                authorization,
                cookie,
            },
            (Some(value), None) => Self::InjectOne {
                header: CredentialHeader::Authorization,
                value,
            },
            (None, Some(value)) => Self::InjectOne {
                header: CredentialHeader::Cookie,
                value,
            },
            (None, None) => Self::Preserve,
        }
    }

    /// Checks if the policy provides credentials for a replay.
    pub fn provides_credentials(&self) -> bool {
        matches!(self, Self::InjectBoth { .. } | Self::InjectOne { .. })
    }

    /// Applies the policy to a raw request.
    pub fn apply(&self, request: &str) -> String {
        match self {
            Self::Preserve => request.to_string(),
            Self::InjectBoth {
                authorization,
                cookie,
            } => {
                let request = rewrite_line(request, AUTHORIZATION, authorization.as_str());
                rewrite_line(&request, COOKIE, cookie.as_str())
            }
            Self::InjectOne { header, value } => {
                rewrite_line(request, header.prefix(), value.as_str())
            }
            Self::StripAll => strip_lines(request, &[AUTHORIZATION, COOKIE]),
        }
    }
}
