//! Request rate limiting.
//!
//! Requests are counted per client fingerprint within a sliding-start time
//! window. Exceeding the quota yields 429. The limit, the remaining budget
//! and the time until reset are exposed through `RateLimit-*` headers on
//! every inspected request.

use crate::http::headers::HeaderName;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::status::StatusCode;
use crate::middleware::{Middleware, Next};
use crate::petrel_error::PetrelResult;
use crate::util::unwrap_poison;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

/// Per-request limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
  /// Requests allowed per window. 0 disables limiting for this request.
  pub quota: u64,
  /// Window duration. Zero disables limiting for this request.
  pub window: Duration,
  /// Client identity. Defaults to the request's peer address with the port
  /// stripped. May be anything hashable into a string: a user id, an API
  /// key, a composite.
  pub fingerprint: Option<String>,
}

impl RateLimitConfig {
  pub fn per_window(quota: u64, window: Duration) -> RateLimitConfig {
    RateLimitConfig { quota, window, fingerprint: None }
  }
}

struct Entry {
  counter: u64,
  resets_at: SystemTime,
}

/// Concurrent fingerprint → entry store. Insertions take the write lock,
/// lookups the read lock; each entry serialises its own updates through its
/// mutex. Entries evict themselves one window after creation.
#[derive(Default)]
struct Store {
  entries: RwLock<HashMap<String, Arc<Mutex<Entry>>>>,
}

impl Store {
  fn get(self: &Arc<Self>, key: &str, window: Duration) -> Arc<Mutex<Entry>> {
    if let Ok(entries) = self.entries.read() {
      if let Some(entry) = entries.get(key) {
        return Arc::clone(entry);
      }
    }

    let mut entries = match self.entries.write() {
      Ok(entries) => entries,
      Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(entry) = entries.get(key) {
      return Arc::clone(entry);
    }

    let entry = Arc::new(Mutex::new(Entry {
      counter: 0,
      resets_at: SystemTime::now() + window,
    }));
    entries.insert(key.to_string(), Arc::clone(&entry));

    // Deferred eviction: the entry removes itself from the store once its
    // window has elapsed.
    let store = Arc::clone(self);
    let evict_key = key.to_string();
    let evict_entry = Arc::clone(&entry);
    std::thread::spawn(move || {
      std::thread::sleep(window);
      if let Ok(mut entries) = store.entries.write() {
        if let Some(current) = entries.get(&evict_key) {
          if Arc::ptr_eq(current, &evict_entry) {
            entries.remove(&evict_key);
          }
        }
      }
    });

    entry
  }
}

enum Decision {
  /// Request allowed. Carries (remaining, reset_seconds).
  Proceed(u64, u64),
  /// Quota reached. Carries (remaining, reset_seconds).
  Reject(u64, u64),
}

/// Token-accounting rate limiter middleware.
pub struct RateLimitMiddleware {
  config: Box<dyn Fn(&Request) -> RateLimitConfig + Send + Sync>,
  store: Arc<Store>,
}

impl RateLimitMiddleware {
  /// Limiter with a per-request configuration function. Returning a zero
  /// quota or window makes the middleware a pass-through for that request.
  pub fn new<F>(config: F) -> RateLimitMiddleware
  where
    F: Fn(&Request) -> RateLimitConfig + Send + Sync + 'static,
  {
    RateLimitMiddleware { config: Box::new(config), store: Arc::new(Store::default()) }
  }

  /// Fixed quota per window for every client.
  pub fn per_window(quota: u64, window: Duration) -> RateLimitMiddleware {
    RateLimitMiddleware::new(move |_| RateLimitConfig::per_window(quota, window))
  }

  fn inspect(&self, key: &str, quota: u64, window: Duration) -> PetrelResult<Decision> {
    let entry = self.store.get(key, window);
    let mut entry = unwrap_poison(entry.lock())?;

    let now = SystemTime::now();
    if now > entry.resets_at {
      // Window expired, start a fresh one.
      entry.counter = 0;
      entry.resets_at = now + window;
    } else if entry.counter >= quota {
      let reset = reset_seconds(entry.resets_at, now);
      return Ok(Decision::Reject(quota.saturating_sub(entry.counter), reset));
    }

    entry.counter += 1;
    let reset = reset_seconds(entry.resets_at, now);
    Ok(Decision::Proceed(quota.saturating_sub(entry.counter), reset))
  }
}

fn reset_seconds(resets_at: SystemTime, now: SystemTime) -> u64 {
  resets_at
    .duration_since(now)
    .map(|d| d.as_secs_f64().round() as u64)
    .unwrap_or(0)
}

fn write_headers(response: &mut Response, quota: u64, window: Duration, remaining: u64, reset: u64) {
  response.set_header(
    HeaderName::RateLimitLimit,
    format!("{}, {};w={}", quota, quota, window.as_secs()),
  );
  response.set_header(HeaderName::RateLimitRemaining, remaining.to_string());
  response.set_header(HeaderName::RateLimitReset, reset.to_string());
}

impl Middleware for RateLimitMiddleware {
  fn handle(
    &self,
    request: &mut Request,
    response: &mut Response,
    next: &Next<'_>,
  ) -> PetrelResult<()> {
    let config = (self.config)(request);
    if config.quota == 0 || config.window.is_zero() {
      return next.run(request, response);
    }

    let fingerprint =
      config.fingerprint.unwrap_or_else(|| request.client_ip().to_string());

    match self.inspect(&fingerprint, config.quota, config.window)? {
      Decision::Proceed(remaining, reset) => {
        write_headers(response, config.quota, config.window, remaining, reset);
        next.run(request, response)
      }
      Decision::Reject(remaining, reset) => {
        write_headers(response, config.quota, config.window, remaining, reset);
        response.status(StatusCode::TooManyRequests);
        Ok(())
      }
    }
  }
}
