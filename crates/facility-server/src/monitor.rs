//! Monitor subscriptions with lazy expiry.
//!
//! A client registers interest in a facility for a number of minutes and a
//! callback endpoint. Subscriptions are not timed out actively: whenever the
//! facility changes, [`MonitorRegistry::notify_if_live`] splits its
//! subscribers into live ones (to push to) and expired ones (removed).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info};

/// Errors returned by [`MonitorRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    /// No facility with that name exists.
    #[error("unknown facility: {0}")]
    UnknownFacility(String),

    /// Negative monitoring window.
    #[error("invalid monitor window: {0} minutes")]
    InvalidWindow(i32),
}

/// One registered monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub endpoint: SocketAddr,
    pub registered: Instant,
    pub window: Duration,
}

impl Subscription {
    /// Live while no more than `window` has elapsed since registration.
    pub fn is_live(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.registered) <= self.window
    }
}

/// Outcome of [`MonitorRegistry::notify_if_live`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Endpoints that should receive a push.
    pub live: Vec<SocketAddr>,
    /// Endpoints whose subscription just expired and was removed.
    pub expired: Vec<SocketAddr>,
}

/// Subscriptions by facility name.
#[derive(Debug, Default)]
pub struct MonitorRegistry {
    facilities: HashSet<String>,
    subscriptions: HashMap<String, Vec<Subscription>>,
}

impl MonitorRegistry {
    /// Creates a registry that accepts subscriptions for the given facilities.
    pub fn new<I, S>(facilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            facilities: facilities.into_iter().map(Into::into).collect(),
            subscriptions: HashMap::new(),
        }
    }

    /// Registers `endpoint` for pushes about `facility` for `window_minutes`.
    ///
    /// Registering the same endpoint again for the same facility restarts its
    /// window instead of adding a second subscription.
    pub fn register(
        &mut self,
        facility: &str,
        endpoint: SocketAddr,
        window_minutes: i32,
        now: Instant,
    ) -> Result<(), MonitorError> {
        if !self.facilities.contains(facility) {
            return Err(MonitorError::UnknownFacility(facility.to_string()));
        }
        let minutes =
            u64::try_from(window_minutes).map_err(|_| MonitorError::InvalidWindow(window_minutes))?;

        let subscription = Subscription {
            endpoint,
            registered: now,
            window: Duration::from_secs(minutes * 60),
        };
        let entries = self.subscriptions.entry(facility.to_string()).or_default();
        entries.retain(|existing| existing.endpoint != endpoint);
        entries.push(subscription);

        info!(facility, %endpoint, window_minutes, "Monitor registered");
        Ok(())
    }

    /// Partitions the subscribers of `facility` into live and expired,
    /// dropping the expired ones.
    pub fn notify_if_live(&mut self, facility: &str, now: Instant) -> Sweep {
        let Some(entries) = self.subscriptions.get_mut(facility) else {
            return Sweep::default();
        };

        let mut sweep = Sweep::default();
        entries.retain(|subscription| {
            if subscription.is_live(now) {
                sweep.live.push(subscription.endpoint);
                true
            } else {
                sweep.expired.push(subscription.endpoint);
                false
            }
        });
        if entries.is_empty() {
            self.subscriptions.remove(facility);
        }

        debug!(
            facility,
            live = sweep.live.len(),
            expired = sweep.expired.len(),
            "Evaluated monitors"
        );
        sweep
    }

    /// Removes expired subscriptions for every facility.
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<SocketAddr> {
        let mut expired = Vec::new();
        self.subscriptions.retain(|_, entries| {
            entries.retain(|subscription| {
                let live = subscription.is_live(now);
                if !live {
                    expired.push(subscription.endpoint);
                }
                live
            });
            !entries.is_empty()
        });
        if !expired.is_empty() {
            debug!(expired = expired.len(), "Swept expired monitors");
        }
        expired
    }

    /// Returns true if any facility still has a subscription for `endpoint`.
    pub fn is_subscribed(&self, endpoint: SocketAddr) -> bool {
        self.subscriptions
            .values()
            .flatten()
            .any(|subscription| subscription.endpoint == endpoint)
    }

    /// Subscriptions currently held for `facility`.
    pub fn subscriptions(&self, facility: &str) -> &[Subscription] {
        self.subscriptions
            .get(facility)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of held subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }

    /// Returns true if no subscriptions are held.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}
