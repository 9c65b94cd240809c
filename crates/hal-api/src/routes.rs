//! The route table: method + path pattern → endpoint, with the capability
//! each route requires.
//!
//! Patterns are compiled once when the table is built. Matching is anchored
//! segment by segment, routes are tried in declaration order and the first
//! match wins. Captured segments are handed to the endpoint positionally,
//! left to right.

use axum::http::Method;
use tracing::debug;

use crate::policy::{ADMIN, AuthRequirement, STAFF};

// ─── Patterns ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Literal(String),
  /// `{id}`: a decimal integer that fits in an `i64`.
  Id,
  /// Any other `{name}`: one or more ASCII word characters or hyphens, the
  /// alphabet of generated slugs.
  Word,
}

impl Segment {
  fn parse(raw: &str) -> Self {
    match raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
      Some("id") => Segment::Id,
      Some(_) => Segment::Word,
      None => Segment::Literal(raw.to_owned()),
    }
  }

  /// `Some(true)` for a matching capture, `Some(false)` for a matching
  /// literal, `None` for a mismatch.
  fn matches(&self, part: &str) -> Option<bool> {
    match self {
      Segment::Literal(lit) => (lit == part).then_some(false),
      Segment::Id => {
        let digits = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        (digits && part.parse::<i64>().is_ok()).then_some(true)
      }
      Segment::Word => {
        let word = !part.is_empty()
          && part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        word.then_some(true)
      }
    }
  }
}

/// A compiled path pattern such as `admin/reviews/{id}/moderate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
  source:   String,
  segments: Vec<Segment>,
}

impl PathPattern {
  pub fn parse(pattern: &str) -> Self {
    let trimmed = pattern.trim_matches('/');
    Self {
      source:   trimmed.to_owned(),
      segments: split(trimmed).map(Segment::parse).collect(),
    }
  }

  pub fn as_str(&self) -> &str { &self.source }

  /// Match a normalised path; on success return the captured segments.
  pub fn captures(&self, path: &str) -> Option<Vec<String>> {
    let mut parts = split(path);
    let mut captured = Vec::new();
    for segment in &self.segments {
      let part = parts.next()?;
      if segment.matches(part)? {
        captured.push(part.to_owned());
      }
    }
    match parts.next() {
      Some(_) => None,
      None => Some(captured),
    }
  }
}

/// Segments of a normalised path; the empty path has none.
fn split(path: &str) -> impl Iterator<Item = &str> {
  path.split('/').filter(|s| !s.is_empty())
}

/// Drop the query string and the `base` prefix, then trim slashes.
pub fn normalize<'a>(path: &'a str, base: &str) -> &'a str {
  let path = path.split_once('?').map_or(path, |(p, _)| p);
  let base = base.trim_end_matches('/');
  let path = match path.strip_prefix(base) {
    Some(rest) if !base.is_empty() && (rest.is_empty() || rest.starts_with('/')) => rest,
    _ => path,
  };
  path.trim_matches('/')
}

// ─── Endpoints ───────────────────────────────────────────────────────────────

/// Every handler the dispatcher can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
  Home,
  Register,
  Login,
  Me,
  Categories,
  Category,
  Cities,
  Companies,
  CreateCompany,
  CompanyReviews,
  CreateReview,
  Company,
  MyDashboard,
  UpdateProfile,
  MyCompanies,
  UpdateMyCompany,
  AdminDashboard,
  AdminCategories,
  AdminCreateCategory,
  AdminUpdateCategory,
  AdminDeleteCategory,
  AdminCompanies,
  AdminCompany,
  AdminCreateCompany,
  AdminUpdateCompany,
  AdminDeleteCompany,
  AdminReviews,
  AdminModerateReview,
  AdminDeleteReview,
  AdminUsers,
  AdminUpdateUserRole,
  AdminToggleUserStatus,
  AdminSettings,
  AdminUpdateSettings,
  AdminLogs,
}

// ─── Table ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Route {
  pub method:      Method,
  pub pattern:     PathPattern,
  pub requirement: AuthRequirement,
  pub endpoint:    Endpoint,
}

/// The outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
  pub endpoint:    Endpoint,
  pub requirement: AuthRequirement,
  pub params:      Vec<String>,
}

/// An ordered, immutable list of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
  routes: Vec<Route>,
}

impl RouteTable {
  pub fn new() -> Self { Self::default() }

  /// Append a route; earlier routes take precedence.
  pub fn route(
    mut self,
    method: Method,
    pattern: &str,
    requirement: AuthRequirement,
    endpoint: Endpoint,
  ) -> Self {
    self.routes.push(Route {
      method,
      pattern: PathPattern::parse(pattern),
      requirement,
      endpoint,
    });
    self
  }

  pub fn routes(&self) -> &[Route] { &self.routes }

  /// First route whose method and pattern both match the normalised `path`.
  pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
    self.routes.iter().find_map(|route| {
      if route.method != *method {
        return None;
      }
      let params = route.pattern.captures(path)?;
      debug!(%method, path, pattern = route.pattern.as_str(), endpoint = ?route.endpoint, "route matched");
      Some(RouteMatch {
        endpoint: route.endpoint,
        requirement: route.requirement,
        params,
      })
    })
  }

  /// The HAL directory API.
  pub fn standard() -> Self {
    use AuthRequirement::{Authenticated, None as Open, Roles};
    use Endpoint::*;

    Self::new()
      // Public
      .route(Method::GET,    "",                               Open,          Home)
      .route(Method::POST,   "auth/register",                  Open,          Register)
      .route(Method::POST,   "auth/login",                     Open,          Login)
      .route(Method::GET,    "auth/me",                        Authenticated, Me)
      .route(Method::GET,    "categories",                     Open,          Categories)
      .route(Method::GET,    "categories/{slug}",              Open,          Category)
      .route(Method::GET,    "cities",                         Open,          Cities)
      .route(Method::GET,    "companies",                      Open,          Companies)
      .route(Method::POST,   "companies",                      Authenticated, CreateCompany)
      .route(Method::GET,    "companies/{id}/reviews",         Open,          CompanyReviews)
      .route(Method::POST,   "companies/{id}/reviews",         Authenticated, CreateReview)
      .route(Method::GET,    "companies/{id}",                 Open,          Company)
      // Owner dashboard
      .route(Method::GET,    "users/me/dashboard",             Authenticated, MyDashboard)
      .route(Method::PUT,    "users/me",                       Authenticated, UpdateProfile)
      .route(Method::GET,    "users/me/companies",             Authenticated, MyCompanies)
      .route(Method::PUT,    "users/me/companies/{id}",        Authenticated, UpdateMyCompany)
      // Admin CMS
      .route(Method::GET,    "admin/dashboard",                Roles(STAFF),  AdminDashboard)
      .route(Method::GET,    "admin/categories",               Roles(STAFF),  AdminCategories)
      .route(Method::POST,   "admin/categories",               Roles(ADMIN),  AdminCreateCategory)
      .route(Method::PUT,    "admin/categories/{id}",          Roles(ADMIN),  AdminUpdateCategory)
      .route(Method::DELETE, "admin/categories/{id}",          Roles(ADMIN),  AdminDeleteCategory)
      .route(Method::GET,    "admin/companies",                Roles(STAFF),  AdminCompanies)
      .route(Method::GET,    "admin/companies/{id}",           Roles(STAFF),  AdminCompany)
      .route(Method::POST,   "admin/companies",                Roles(ADMIN),  AdminCreateCompany)
      .route(Method::PUT,    "admin/companies/{id}",           Roles(ADMIN),  AdminUpdateCompany)
      .route(Method::DELETE, "admin/companies/{id}",           Roles(ADMIN),  AdminDeleteCompany)
      .route(Method::GET,    "admin/reviews",                  Roles(STAFF),  AdminReviews)
      .route(Method::PUT,    "admin/reviews/{id}/moderate",    Roles(ADMIN),  AdminModerateReview)
      .route(Method::DELETE, "admin/reviews/{id}",             Roles(ADMIN),  AdminDeleteReview)
      .route(Method::GET,    "admin/users",                    Roles(STAFF),  AdminUsers)
      .route(Method::PUT,    "admin/users/{id}/role",          Roles(ADMIN),  AdminUpdateUserRole)
      .route(Method::PUT,    "admin/users/{id}/toggle-status", Roles(ADMIN),  AdminToggleUserStatus)
      .route(Method::GET,    "admin/settings",                 Roles(STAFF),  AdminSettings)
      .route(Method::PUT,    "admin/settings",                 Roles(ADMIN),  AdminUpdateSettings)
      .route(Method::GET,    "admin/logs",                     Roles(STAFF),  AdminLogs)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_strips_base_query_and_slashes() {
    assert_eq!(normalize("/api/companies/7/", "/api"), "companies/7");
    assert_eq!(normalize("/api/companies?sort=rating", "/api"), "companies");
    assert_eq!(normalize("/api", "/api"), "");
    assert_eq!(normalize("/api/", "/api/"), "");
    assert_eq!(normalize("/companies", ""), "companies");
    // Only a whole leading segment counts as the base.
    assert_eq!(normalize("/apiary/x", "/api"), "apiary/x");
  }

  #[test]
  fn captures_are_positional_and_anchored() {
    let pattern = PathPattern::parse("admin/companies/{id}/images/{id}");
    assert_eq!(
      pattern.captures("admin/companies/12/images/3"),
      Some(vec!["12".to_owned(), "3".to_owned()])
    );
    assert_eq!(pattern.captures("admin/companies/12/images"), None);
    assert_eq!(pattern.captures("admin/companies/12/images/3/main"), None);
    assert_eq!(pattern.captures("x/admin/companies/12/images/3"), None);
  }

  #[test]
  fn id_segment_requires_digits() {
    let pattern = PathPattern::parse("companies/{id}");
    assert!(pattern.captures("companies/42").is_some());
    assert!(pattern.captures("companies/4a").is_none());
    assert!(pattern.captures("companies/-1").is_none());
    assert!(pattern.captures("companies/99999999999999999999").is_none());
  }

  #[test]
  fn word_segment_accepts_slug_characters() {
    let pattern = PathPattern::parse("categories/{slug}");
    assert_eq!(pattern.captures("categories/auto_service"), Some(vec!["auto_service".into()]));
    assert_eq!(pattern.captures("categories/auto-service"), Some(vec!["auto-service".into()]));
    assert!(pattern.captures("categories/auto.service").is_none());
    assert!(pattern.captures("categories/auto%20service").is_none());
  }

  #[test]
  fn empty_pattern_matches_only_root() {
    let pattern = PathPattern::parse("");
    assert_eq!(pattern.captures(""), Some(vec![]));
    assert_eq!(pattern.captures("companies"), None);
  }

  #[test]
  fn first_declared_of_overlapping_routes_wins() {
    let by_id = RouteTable::new()
      .route(Method::GET, "items/{id}", AuthRequirement::None, Endpoint::Company)
      .route(Method::GET, "items/{slug}", AuthRequirement::None, Endpoint::Categories);
    let by_slug = RouteTable::new()
      .route(Method::GET, "items/{slug}", AuthRequirement::None, Endpoint::Categories)
      .route(Method::GET, "items/{id}", AuthRequirement::None, Endpoint::Company);

    for _ in 0..3 {
      assert_eq!(by_id.find(&Method::GET, "items/5").unwrap().endpoint, Endpoint::Company);
      assert_eq!(by_slug.find(&Method::GET, "items/5").unwrap().endpoint, Endpoint::Categories);
    }
    // Only the word pattern accepts non-digits.
    assert_eq!(by_id.find(&Method::GET, "items/abc").unwrap().endpoint, Endpoint::Categories);
  }

  #[test]
  fn method_must_match() {
    let table = RouteTable::standard();
    assert!(table.find(&Method::GET, "auth/login").is_none());
    assert!(table.find(&Method::PATCH, "companies/1").is_none());
  }

  #[test]
  fn every_standard_route_is_reachable() {
    let table = RouteTable::standard();
    for route in table.routes() {
      let path = route.pattern.as_str().replace("{id}", "7").replace("{slug}", "cafes");
      let found = table.find(&route.method, &path).unwrap();
      assert_eq!(found.endpoint, route.endpoint, "{} {path}", route.method);
      assert_eq!(found.requirement, route.requirement);
    }
  }

  #[test]
  fn admin_writes_require_admin_role() {
    for route in RouteTable::standard().routes() {
      if route.pattern.as_str().starts_with("admin/") && route.method != Method::GET {
        assert_eq!(
          route.requirement,
          AuthRequirement::Roles(ADMIN),
          "{} {}",
          route.method,
          route.pattern.as_str()
        );
      }
    }
  }

  #[test]
  fn captures_reach_the_endpoint() {
    let table = RouteTable::standard();
    let found = table.find(&Method::PUT, "admin/reviews/15/moderate").unwrap();
    assert_eq!(found.endpoint, Endpoint::AdminModerateReview);
    assert_eq!(found.params, vec!["15".to_owned()]);
    assert_eq!(found.requirement, AuthRequirement::Roles(ADMIN));

    let found = table.find(&Method::GET, "companies/3/reviews").unwrap();
    assert_eq!(found.endpoint, Endpoint::CompanyReviews);

    let found = table.find(&Method::GET, "categories/auto-service").unwrap();
    assert_eq!(found.endpoint, Endpoint::Category);
    assert_eq!(found.params, vec!["auto-service".to_owned()]);
    assert_eq!(found.requirement, AuthRequirement::None);

    assert_eq!(table.find(&Method::PUT, "users/me").unwrap().endpoint, Endpoint::UpdateProfile);
    assert_eq!(
      table.find(&Method::PUT, "users/me/companies/4").unwrap().endpoint,
      Endpoint::UpdateMyCompany
    );
    assert!(table.find(&Method::GET, "nonexistent").is_none());
  }
}
