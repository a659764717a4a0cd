//! Exchange state machine and follow-up decisions.
//!
//! WHY: One logical request can take several round trips (100-continue,
//! auth challenges, redirects). Keeping the states explicit, and the
//! decisions pure, lets the loop be tested without sockets.
//!
//! WHAT: `ExchangeState` with `transition`, and `decide_follow_up`, which
//! maps a response head onto the next step.

use url::Url;

use crate::wire::simple_http::client::{
    authority_changed, encode_credentials, is_redirect, parse_challenges,
    parse_use_proxy_location, resolve_location, AuthRequest, AuthTarget, Authenticator,
    HttpClientError, ProxyAddress, USE_PROXY,
};
use crate::wire::simple_http::HttpHeaders;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Unconnected,
    Connecting,
    Sending,
    AwaitingStatusLine,
    ReadingHeaders,
    BodyReady,
    Reauth,
    Redirect,
}

/// What a response head means for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadOutcome {
    /// `100 Continue`: another status line follows.
    Continue,
    Final,
    Challenge,
    Redirect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    Connect,
    CacheHit,
    Connected,
    RequestSent,
    StatusLineRead,
    HeadersRead(HeadOutcome),
    Retry,
    Disconnect,
}

impl ExchangeState {
    /// Next state for `event`, or `None` when the event is not valid here.
    #[must_use]
    pub fn transition(self, event: ExchangeEvent) -> Option<ExchangeState> {
        use ExchangeEvent as E;
        use ExchangeState as S;

        match (self, event) {
            (_, E::Disconnect) => Some(S::Unconnected),
            (S::Unconnected, E::Connect) => Some(S::Connecting),
            (S::Unconnected | S::Connecting, E::CacheHit) => Some(S::BodyReady),
            (S::Connecting, E::Connected) => Some(S::Sending),
            (S::Sending, E::RequestSent) => Some(S::AwaitingStatusLine),
            (S::AwaitingStatusLine, E::StatusLineRead) => Some(S::ReadingHeaders),
            (S::ReadingHeaders, E::HeadersRead(outcome)) => Some(match outcome {
                HeadOutcome::Continue => S::AwaitingStatusLine,
                HeadOutcome::Final => S::BodyReady,
                HeadOutcome::Challenge => S::Reauth,
                HeadOutcome::Redirect => S::Redirect,
            }),
            (S::Reauth | S::Redirect, E::Retry) => Some(S::Connecting),
            _ => None,
        }
    }

    /// True once the request head may no longer change.
    #[must_use]
    pub fn request_committed(self) -> bool {
        matches!(
            self,
            Self::AwaitingStatusLine | Self::ReadingHeaders | Self::BodyReady
        )
    }
}

/// Next step after a complete, non-100 response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    /// Hand this response to the caller.
    Final,
    /// Repeat the request carrying `value` in `header`.
    Authorize {
        target: AuthTarget,
        header: &'static str,
        value: String,
    },
    /// Repeat the request against `url`. `drop_host` is set when the
    /// authority changed, so a caller-provided `Host` must go.
    Redirect { url: Url, drop_host: bool },
    /// Repeat the request through this proxy.
    UseProxy(ProxyAddress),
}

impl FollowUp {
    #[must_use]
    pub fn outcome(&self) -> HeadOutcome {
        match self {
            Self::Final => HeadOutcome::Final,
            Self::Authorize { .. } => HeadOutcome::Challenge,
            Self::Redirect { .. } | Self::UseProxy(_) => HeadOutcome::Redirect,
        }
    }
}

/// Facts `decide_follow_up` needs about the current round trip.
#[derive(Debug, Clone, Copy)]
pub struct FollowUpContext<'a> {
    pub code: u16,
    pub headers: &'a HttpHeaders,
    pub url: &'a Url,
    pub proxy: Option<&'a ProxyAddress>,
    pub follow_redirects: bool,
    /// A request body was written in this exchange.
    pub has_request_body: bool,
    /// Redirects already followed.
    pub redirects: u32,
    pub max_redirects: u32,
    /// Credential retries already made.
    pub auth_attempts: u32,
    pub max_auth_attempts: u32,
}

/// Decides what to do with a response head.
///
/// - 401/407: the first challenge the authenticator answers becomes an
///   `Authorize`; no answer, no authenticator, or too many attempts make the
///   response final.
/// - redirect codes: followed only when enabled and no request body was
///   sent; a scheme change or a missing `Location` makes the response final.
///
/// # Errors
///
/// - `ProxyAuthWithoutProxy` for a 407 on a direct connection
/// - `MissingChallenge` for a 401/407 without its challenge header
/// - `TooManyRedirects` once `max_redirects` redirects were already followed
/// - `InvalidUrl` / `InvalidProxy` for unusable `Location` values
pub fn decide_follow_up(
    context: &FollowUpContext<'_>,
    authenticator: Option<&dyn Authenticator>,
) -> Result<FollowUp, HttpClientError> {
    if let Some(target) = AuthTarget::from_status(context.code) {
        return decide_auth(context, target, authenticator);
    }

    if !(context.follow_redirects && is_redirect(context.code)) || context.has_request_body {
        return Ok(FollowUp::Final);
    }

    let attempt = context.redirects + 1;
    if attempt > context.max_redirects {
        return Err(HttpClientError::TooManyRedirects(attempt));
    }

    let Some(location) = context.headers.get("Location") else {
        return Ok(FollowUp::Final);
    };

    if context.code == USE_PROXY {
        return Ok(FollowUp::UseProxy(parse_use_proxy_location(location)?));
    }

    let next = resolve_location(context.url, location)?;
    if next.scheme() != context.url.scheme() {
        tracing::debug!("Not following redirect from {} to {next}: scheme changed", context.url);
        return Ok(FollowUp::Final);
    }

    let drop_host = authority_changed(context.url, &next);
    Ok(FollowUp::Redirect {
        url: next,
        drop_host,
    })
}

fn decide_auth(
    context: &FollowUpContext<'_>,
    target: AuthTarget,
    authenticator: Option<&dyn Authenticator>,
) -> Result<FollowUp, HttpClientError> {
    if target == AuthTarget::Proxy && context.proxy.is_none() {
        return Err(HttpClientError::ProxyAuthWithoutProxy);
    }

    let challenge_header = target.challenge_header();
    if context.headers.get(challenge_header).is_none() {
        return Err(HttpClientError::MissingChallenge(context.code));
    }

    let Some(authenticator) = authenticator else {
        return Ok(FollowUp::Final);
    };
    if context.auth_attempts >= context.max_auth_attempts {
        tracing::debug!("Giving up on {} after {} attempts", context.code, context.auth_attempts);
        return Ok(FollowUp::Final);
    }

    let (host, port) = match (target, context.proxy) {
        (AuthTarget::Proxy, Some(proxy)) => (proxy.host.as_str(), proxy.port),
        _ => (
            context.url.host_str().unwrap_or_default(),
            context.url.port_or_known_default().unwrap_or_default(),
        ),
    };

    for challenge in parse_challenges(context.headers, challenge_header) {
        let request = AuthRequest {
            target,
            host,
            port,
            url: context.url,
            scheme: &challenge.scheme,
            realm: &challenge.realm,
        };
        if let Some(credentials) = authenticator.credentials(&request) {
            return Ok(FollowUp::Authorize {
                target,
                header: target.credentials_header(),
                value: encode_credentials(&challenge.scheme, &credentials),
            });
        }
    }

    Ok(FollowUp::Final)
}
