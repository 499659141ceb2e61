//! Redirect handling: retargeting a request and counting hops.

use hopline_wire::cgi;
use hopline_wire::{HostInfo, HostList, RedirectSignal, Request};

/// Routing state of one operation as it moves between hosts.
#[derive(Debug, Clone)]
pub struct Route {
    pub request: Request,
    /// Redirects followed so far.
    pub hops: u16,
    pub hosts: HostList,
}

impl Route {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            hops: 0,
            hosts: Vec::new(),
        }
    }

    /// Record that the current target is being contacted.
    pub fn record_visit(&mut self) {
        self.hosts.push(HostInfo::new(
            self.request.host.clone(),
            self.request.path.clone(),
        ));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The request was retargeted and should be sent again.
    Continue,
    /// Following this redirect would exceed the hop limit.
    LimitExceeded,
    /// The request was retargeted, but redirects are handed back to the
    /// caller instead of being followed.
    NotFollowed,
    /// The server sent a redirect no request can be sent to.
    Invalid(String),
}

/// Applies redirect signals to routes under a hop limit.
#[derive(Debug, Clone, Copy)]
pub struct RedirectResolver {
    limit: u16,
    follow: bool,
}

impl RedirectResolver {
    pub fn new(limit: u16) -> Self {
        Self {
            limit,
            follow: true,
        }
    }

    /// Stop at the first redirect and report where it pointed.
    pub fn with_follow(mut self, follow: bool) -> Self {
        self.follow = follow;
        self
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    pub fn follows(&self) -> bool {
        self.follow
    }

    /// Count the hop and, while under the limit, point the request at the
    /// redirect target.
    ///
    /// An empty or absent path keeps the current one. The redirect's query
    /// parameters are merged into the request's, replacing or appending as
    /// the signal says. A malformed signal leaves the route untouched.
    pub fn apply(&self, route: &mut Route, signal: RedirectSignal) -> Verdict {
        if let Err(reason) = check(&signal) {
            return Verdict::Invalid(reason);
        }
        if !self.follow {
            retarget(&mut route.request, signal);
            return Verdict::NotFollowed;
        }

        route.hops = route.hops.saturating_add(1);
        if route.hops > self.limit {
            return Verdict::LimitExceeded;
        }
        retarget(&mut route.request, signal);
        Verdict::Continue
    }
}

fn check(signal: &RedirectSignal) -> Result<(), String> {
    let host = signal.host.trim();
    if host.is_empty() {
        return Err("redirect names no host".to_string());
    }
    if host.contains(|c: char| c.is_whitespace() || c == '/' || c == '\0') {
        return Err(format!("redirect host '{}' is malformed", signal.host));
    }
    if let Some(path) = signal.path.as_deref().filter(|p| !p.is_empty()) {
        if !path.starts_with('/') || path.contains('\0') {
            return Err(format!("redirect path {:?} is not an absolute path", path));
        }
    }
    Ok(())
}

fn retarget(request: &mut Request, signal: RedirectSignal) {
    request.host = signal.host;
    if let Some(path) = signal.path.filter(|p| !p.is_empty()) {
        request.path = path;
    }
    request.cgi = cgi::merge(&request.cgi, &signal.cgi, signal.replace);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopline_wire::{CgiMap, OpKind};

    fn route() -> Route {
        Route::new(
            Request::new(OpKind::Stat, "/data/f")
                .with_host("redirector:1094")
                .with_cgi("tried", "s0"),
        )
    }

    #[test]
    fn retargets_host_and_keeps_path() {
        let resolver = RedirectResolver::new(16);
        let mut route = route();
        let verdict = resolver.apply(&mut route, RedirectSignal::to("s1:1094"));
        assert_eq!(verdict, Verdict::Continue);
        assert_eq!(route.hops, 1);
        assert_eq!(route.request.host, "s1:1094");
        assert_eq!(route.request.path, "/data/f");
        assert_eq!(route.request.cgi.get("tried"), Some("s0"));
    }

    #[test]
    fn empty_path_keeps_current_path() {
        let resolver = RedirectResolver::new(16);
        let mut route = route();
        resolver.apply(&mut route, RedirectSignal::to("s1").with_path(""));
        assert_eq!(route.request.path, "/data/f");

        resolver.apply(&mut route, RedirectSignal::to("s2").with_path("/other"));
        assert_eq!(route.request.path, "/other");
    }

    #[test]
    fn cgi_replace_and_append() {
        let resolver = RedirectResolver::new(16);

        let mut replaced = route();
        resolver.apply(
            &mut replaced,
            RedirectSignal::to("s1").with_cgi(CgiMap::parse("tried=s1&tok=a"), true),
        );
        assert_eq!(replaced.request.cgi, CgiMap::parse("tried=s1&tok=a"));

        let mut appended = route();
        resolver.apply(
            &mut appended,
            RedirectSignal::to("s1").with_cgi(CgiMap::parse("tried=s1"), false),
        );
        assert_eq!(appended.request.cgi.get("tried"), Some("s0,s1"));
    }

    #[test]
    fn limit_is_inclusive() {
        let resolver = RedirectResolver::new(2);
        let mut route = route();
        assert_eq!(resolver.apply(&mut route, RedirectSignal::to("a")), Verdict::Continue);
        assert_eq!(resolver.apply(&mut route, RedirectSignal::to("b")), Verdict::Continue);
        assert_eq!(
            resolver.apply(&mut route, RedirectSignal::to("c")),
            Verdict::LimitExceeded
        );
        // The rejected hop does not retarget the request.
        assert_eq!(route.request.host, "b");
    }

    #[test]
    fn zero_limit_rejects_first_redirect() {
        let resolver = RedirectResolver::new(0);
        let mut route = route();
        assert_eq!(
            resolver.apply(&mut route, RedirectSignal::to("s1")),
            Verdict::LimitExceeded
        );
        assert_eq!(route.request.host, "redirector:1094");
    }

    #[test]
    fn malformed_signals_are_invalid() {
        let resolver = RedirectResolver::new(16);
        for signal in [
            RedirectSignal::to(""),
            RedirectSignal::to("  "),
            RedirectSignal::to("s1/x"),
            RedirectSignal::to("s1").with_path("relative"),
            RedirectSignal::to("s1").with_path("/a\0b"),
        ] {
            let mut route = route();
            let verdict = resolver.apply(&mut route, signal.clone());
            assert!(matches!(verdict, Verdict::Invalid(_)), "{:?}", signal);
            assert_eq!(route.hops, 0);
            assert_eq!(route.request.host, "redirector:1094");
        }
    }

    #[test]
    fn unfollowed_redirect_retargets_without_counting() {
        let resolver = RedirectResolver::new(0).with_follow(false);
        assert!(!resolver.follows());
        let mut route = route();
        let verdict = resolver.apply(
            &mut route,
            RedirectSignal::to("s1")
                .with_path("/moved")
                .with_cgi(CgiMap::parse("tried=s1"), false),
        );
        assert_eq!(verdict, Verdict::NotFollowed);
        assert_eq!(route.hops, 0);
        assert_eq!(route.request.host, "s1");
        assert_eq!(route.request.target(), "/moved?tried=s0%2Cs1");
    }

    #[test]
    fn visits_are_recorded_in_order() {
        let resolver = RedirectResolver::new(16);
        let mut route = route();
        route.record_visit();
        resolver.apply(&mut route, RedirectSignal::to("s1").with_path("/moved"));
        route.record_visit();
        let hosts: Vec<_> = route
            .hosts
            .iter()
            .map(|h| (h.host.as_str(), h.path.as_str()))
            .collect();
        assert_eq!(hosts, vec![("redirector:1094", "/data/f"), ("s1", "/moved")]);
    }
}
