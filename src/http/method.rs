//! HTTP request methods.

use std::fmt::Display;

/// Represents an HTTP method.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum Method {
  /// `GET`, a side-effect free read of a resource.
  Get,
  /// `HEAD`, a `GET` whose response body is suppressed. Every `GET` route
  /// answers it implicitly.
  Head,
  /// `POST`, submits data to a resource.
  Post,
  /// `PUT`, creates or wholly replaces a resource.
  Put,
  /// `PATCH`, applies a partial update to a resource.
  Patch,
  /// `DELETE`, removes a resource.
  Delete,
  /// `OPTIONS`, queries the allowed communication options. CORS preflights
  /// use it, so CORS-enabled routers allow it on all their routes.
  Options,
  /// A verb without its own variant, kept verbatim.
  Custom(String),
}

impl Method {
  pub fn as_str(&self) -> &str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
      Method::Options => "OPTIONS",
      Method::Custom(name) => name.as_str(),
    }
  }
}

impl From<&str> for Method {
  fn from(name: &str) -> Self {
    match name {
      "GET" => Self::Get,
      "HEAD" => Self::Head,
      "POST" => Self::Post,
      "PUT" => Self::Put,
      "PATCH" => Self::Patch,
      "DELETE" => Self::Delete,
      "OPTIONS" => Self::Options,
      _ => Self::Custom(name.to_string()),
    }
  }
}

impl Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}
