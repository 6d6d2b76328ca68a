// src/net/status.rs

//! Request status observer
//!
//! A `StatusContext` is attached to a request before it is sent. The
//! transport reports name resolution, connection and redirect events to it;
//! the caller reads the captured values once the receive call has returned.
//! The observer never follows redirects itself.

use super::url::Url;
use tracing::debug;

/// Events reported by the transport while a request is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent<'a> {
    /// Name resolution started for this host
    ResolvingName(&'a str),
    /// Name resolution finished with this address
    NameResolved(&'a str),
    /// TCP connection established to this address
    ConnectedToServer(&'a str),
    /// Server redirected to this `Location` value
    Redirect(&'a str),
}

/// Last-seen values captured from status events
#[derive(Debug, Default)]
pub struct StatusContext {
    debug: bool,
    resolving_name: String,
    resolved_name: String,
    location: String,
}

impl StatusContext {
    /// Create an observer; `debug` enables diagnostic tracing per event
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            ..Default::default()
        }
    }

    pub fn on_status(&mut self, event: StatusEvent<'_>) {
        match event {
            StatusEvent::ResolvingName(name) => {
                self.resolving_name.clear();
                self.resolving_name.push_str(name);
            }
            StatusEvent::NameResolved(address) => {
                self.resolved_name.clear();
                self.resolved_name.push_str(address);
                if self.debug {
                    debug!("Resolve {} ... {}", self.resolving_name, address);
                }
            }
            StatusEvent::ConnectedToServer(address) => {
                if self.debug {
                    debug!("Connecting to {}|{}| connected.", self.resolving_name, address);
                }
            }
            StatusEvent::Redirect(location) => {
                self.location.clear();
                self.location.push_str(location);
                if self.debug {
                    debug!("Location: {} [following]", location);
                }
            }
        }
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Hostname passed to the most recent resolution
    pub fn resolving_name(&self) -> &str {
        &self.resolving_name
    }

    /// Address produced by the most recent resolution
    pub fn resolved_name(&self) -> &str {
        &self.resolved_name
    }

    /// Most recent `Location` value, verbatim
    pub fn location(&self) -> Option<&str> {
        if self.location.is_empty() {
            None
        } else {
            Some(&self.location)
        }
    }

    /// Parse the captured `Location` as an absolute URL
    pub fn crack_location_url(&self) -> Option<Url> {
        self.location().and_then(|l| Url::parse(l).ok())
    }

    /// Resolve the captured `Location` against the URL that produced it
    pub fn location_url(&self, base: &Url) -> Option<Url> {
        self.location().and_then(|l| base.join(l).ok())
    }
}
