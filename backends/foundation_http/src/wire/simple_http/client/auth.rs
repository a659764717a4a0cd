use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

use crate::wire::simple_http::HttpHeaders;

/// Which side issued a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTarget {
    /// `401` with `WWW-Authenticate`, answered with `Authorization`.
    Server,
    /// `407` with `Proxy-Authenticate`, answered with `Proxy-Authorization`.
    Proxy,
}

impl AuthTarget {
    #[must_use]
    pub fn challenge_header(&self) -> &'static str {
        match self {
            Self::Server => "WWW-Authenticate",
            Self::Proxy => "Proxy-Authenticate",
        }
    }

    #[must_use]
    pub fn credentials_header(&self) -> &'static str {
        match self {
            Self::Server => "Authorization",
            Self::Proxy => "Proxy-Authorization",
        }
    }

    #[must_use]
    pub fn from_status(code: u16) -> Option<Self> {
        match code {
            401 => Some(Self::Server),
            407 => Some(Self::Proxy),
            _ => None,
        }
    }
}

/// One `scheme realm="..."` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: String,
    pub realm: String,
}

/// Everything an authenticator is told about a challenge.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub target: AuthTarget,
    pub host: &'a str,
    pub port: u16,
    pub url: &'a Url,
    pub scheme: &'a str,
    pub realm: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Supplies credentials for challenges, or declines with `None`.
pub trait Authenticator: Send + Sync {
    fn credentials(&self, request: &AuthRequest<'_>) -> Option<Credentials>;
}

fn skip_until(input: &str, pos: usize, characters: &[char]) -> usize {
    input[pos..]
        .find(characters)
        .map_or(input.len(), |offset| pos + offset)
}

fn skip_whitespace(input: &str, pos: usize) -> usize {
    input[pos..]
        .find(|c: char| c != ' ' && c != '\t')
        .map_or(input.len(), |offset| pos + offset)
}

/// Collects the challenges from every `header` field in `headers`.
///
/// Only challenges carrying a quoted `realm` parameter are understood;
/// parsing of a field stops at the first one that does not.
#[must_use]
pub fn parse_challenges(headers: &HttpHeaders, header: &str) -> Vec<Challenge> {
    const REALM: &str = "realm=\"";
    let mut challenges = Vec::new();

    for (name, value) in headers.fields() {
        if !name.eq_ignore_ascii_case(header) {
            continue;
        }

        let mut pos = 0;
        while pos < value.len() {
            let token_start = pos;
            pos = skip_until(value, pos, &[' ']);
            let scheme = value[token_start..pos].trim();
            pos = skip_whitespace(value, pos);

            if !value[pos..].starts_with(REALM) {
                break;
            }
            pos += REALM.len();
            let realm_start = pos;
            pos = skip_until(value, pos, &['"']);
            let realm = &value[realm_start..pos];

            pos = skip_until(value, (pos + 1).min(value.len()), &[',']);
            pos = skip_whitespace(value, (pos + 1).min(value.len()));

            challenges.push(Challenge {
                scheme: scheme.to_string(),
                realm: realm.to_string(),
            });
        }
    }
    challenges
}

/// Renders `<scheme> base64(user:password)` with the credentials encoded as
/// ISO-8859-1. Characters outside that range become `?`.
#[must_use]
pub fn encode_credentials(scheme: &str, credentials: &Credentials) -> String {
    let joined = format!("{}:{}", credentials.username, credentials.password);
    let latin1: Vec<u8> = joined
        .chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect();
    format!("{scheme} {}", STANDARD.encode(latin1))
}
