//! Live engine state
//!
//! [`Firewall`] owns the ruleset the packet path evaluates. The ruleset is
//! held as an immutable [`Snapshot`] behind an `Arc`. A check clones the
//! `Arc` and evaluates against that snapshot without holding any lock, so a
//! concurrent [`Firewall::install`] never changes rules under a packet that
//! is mid-traversal: the packet finishes against the snapshot it started
//! with and the next packet sees the new one.
//!
//! Installation is the only place rulesets are validated.

use crate::core::defaults::default_tables;
use crate::core::error::Result;
use crate::core::hook::Hook;
use crate::core::iptables::IpTables;
use crate::core::packet::Packet;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// A validated, immutable ruleset.
#[derive(Debug)]
pub struct Snapshot {
    pub id: Uuid,
    /// Install sequence number, starting at 1
    pub generation: u64,
    pub installed_at: DateTime<Utc>,
    tables: IpTables,
}

impl Snapshot {
    pub fn tables(&self) -> &IpTables {
        &self.tables
    }

    /// Runs `packet` through this snapshot. See [`IpTables::check`].
    pub fn check(&self, hook: Hook, packet: &Packet) -> bool {
        self.tables.check(hook, packet)
    }
}

pub struct Firewall {
    current: RwLock<Arc<Snapshot>>,
    generation: AtomicU64,
}

impl Firewall {
    /// Creates an engine running `tables`.
    ///
    /// # Errors
    ///
    /// Returns the configuration violation if `tables` fails validation.
    pub fn new(tables: IpTables) -> Result<Self> {
        tables.validate()?;
        let snapshot = Self::seal(tables, 1);
        info!(id = %snapshot.id, rules = snapshot.tables.rule_count(), "ruleset installed");
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            generation: AtomicU64::new(1),
        })
    }

    /// Creates an engine running [`default_tables`].
    pub fn with_defaults() -> Result<Self> {
        Self::new(default_tables())
    }

    /// Returns the snapshot new checks run against.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Runs `packet` through the current ruleset.
    ///
    /// Returns `true` if the packet continues through the stack and `false`
    /// if the caller must discard it.
    pub fn check(&self, hook: Hook, packet: &Packet) -> bool {
        self.snapshot().check(hook, packet)
    }

    /// Validates `tables` and swaps it in as the current ruleset.
    ///
    /// On error the running ruleset is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the configuration violation if `tables` fails validation.
    pub fn install(&self, tables: IpTables) -> Result<Arc<Snapshot>> {
        if let Err(e) = tables.validate() {
            warn!("Rejected ruleset: {}", e);
            return Err(e);
        }

        // Generations increase in the order snapshots become visible.
        let (snapshot, previous) = {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let snapshot = Arc::new(Self::seal(tables, generation));
            let previous = std::mem::replace(&mut *guard, Arc::clone(&snapshot));
            (snapshot, previous)
        };

        info!(
            id = %snapshot.id,
            generation = snapshot.generation,
            replaced = %previous.id,
            rules = snapshot.tables.rule_count(),
            "ruleset installed"
        );
        Ok(snapshot)
    }

    fn seal(tables: IpTables, generation: u64) -> Snapshot {
        Snapshot {
            id: Uuid::new_v4(),
            generation,
            installed_at: Utc::now(),
            tables,
        }
    }
}
