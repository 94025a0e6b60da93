//! PharmaNotify daemon - expiry surveillance and notification delivery
//!
//! This crate provides the daemon's moving parts:
//! - `config` - layered configuration (file, environment, defaults)
//! - `registry` - live-session registry actor, one session per farmacia
//! - `bus` - broadcast channel carrying persisted notifications
//! - `scheduler` - job queue, worker pool, and periodic timers
//! - `server` - TCP client channel and Unix-socket admin channel
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        pharmad daemon                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────────┐   admit/deliver   ┌─────────────────────┐  │
//! │  │ Coordinator  │──────────────────▶│   RegistryActor     │  │
//! │  │ (TCP + UDS)  │                   │ (session state)     │  │
//! │  └──────┬───────┘                   └──────────▲──────────┘  │
//! │         │ enqueue                              │ deliver     │
//! │         ▼                                      │             │
//! │  ┌──────────────┐  persist  ┌─────────┐  ┌─────┴──────────┐  │
//! │  │  Scheduler   │──────────▶│  Store  │  │ bus forwarder  │  │
//! │  │ (worker pool)│           │ (SQLite)│  └─────▲──────────┘  │
//! │  └──────┬───────┘           └─────────┘        │             │
//! │         │ publish                              │             │
//! │         └────────────▶ NotificationBus ────────┘             │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Notifications are persisted before they are published, so a delivery
//! that never happens (farmacia offline, slow session, daemon restart)
//! still surfaces on the next history request.

pub mod bus;
pub mod config;
pub mod registry;
pub mod scheduler;
pub mod server;
