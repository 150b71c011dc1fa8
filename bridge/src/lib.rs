//! # Game Server Bridge Library
//!
//! This library provides the core of a bridge between a Half-Life / CS 1.6
//! game server and a chat platform. It owns the RCON session to the server,
//! turns inbound webhook payloads into typed events, aggregates "wow moment"
//! votes into stable clusters, and resolves demo recordings for them.
//!
//! ## Core Responsibilities
//!
//! ### Server Control
//! A single supervised RCON session carries all commands to the game
//! server: chat relay, player kicks and bans, map changes and map listing
//! queries. The supervisor reconnects on a fixed cadence, guards against
//! retry floods, and collapses repeated failures into a single
//! "disconnected" notification per outage.
//!
//! ### Game Event Intake
//! The game-side plugin posts JSON webhooks for chat lines, periodic status
//! snapshots and moment votes. The intake recognizes payload types
//! leniently (names, numeric codes, spellings within one typo) and drops
//! malformed payloads with a log line instead of failing the loop.
//!
//! ### Moment Highlights
//! Votes cast in-game are clustered by target and time proximity, so a
//! burst of votes for the same play becomes one event with a star count
//! instead of a message per vote. Each new cluster kicks off a background
//! lookup that finds the matching demo recording via the HLTV status line
//! or an FTP file listing and builds a download URL for it.
//!
//! ## Architecture Design
//!
//! ### Shared Session, Explicit Wiring
//! All components are constructed in `main` and passed around as `Arc`
//! handles. The RCON session lives behind one async mutex; the supervisor,
//! the command pipeline and the highlight service share it without any
//! global state.
//!
//! ### Event Bus
//! Outbound notifications (connection transitions, chat lines, panels,
//! cluster lifecycle) go through an explicit registry of async handlers
//! invoked sequentially in registration order. The delivery side of the
//! chat platform subscribes there and stays out of this crate.
//!
//! ### Supervised Background Tasks
//! Periodic work runs on one loop shape: tick, run the body, log failures,
//! keep going, stop on the shutdown signal. The reconnect loop and the
//! per-cluster demo retries both follow it.
//!
//! ## Module Organization
//!
//! ### Commands Module (`commands`)
//! The RCON command pipeline: chat relay with plugin-imposed length
//! limits, admin actions, and the marker-framed map listing protocol.
//!
//! ### Webhook Module (`webhook`)
//! Payload type recognition and tolerant parsing of chat, status and vote
//! payloads, plus the dispatcher routing them onward.
//!
//! ### Highlights Module (`highlights`)
//! Glue between the moment engine, the demo resolver and the event bus,
//! including the per-cluster demo retry tasks.

pub mod commands;
pub mod config;
pub mod events;
pub mod format;
pub mod highlights;
pub mod supervisor;
pub mod tasks;
pub mod webhook;
