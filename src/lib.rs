//! # SAP ADT Broker
//!
//! A Rust engine that turns tool invocations from LLM-driven CLI agents
//! into correct, stateful HTTP and WebSocket sequences against an SAP
//! ABAP Development Tools (ADT) server.
//!
//! ## Governing Principle: "Thin Client, Rich Protocol"
//!
//! ADT itself is stateful — locks, CSRF tokens, activation sessions and
//! transport requests all carry server-side state across calls. This
//! engine does not try to hide that statefulness behind an illusion of
//! idempotent calls; it makes the protocol's real sequencing explicit
//! (lock before write, unlock on every exit path, fetch a CSRF token once
//! and refresh it exactly once on rejection) while keeping the surface an
//! agent calls against small and stable.
//!
//! Key principles:
//! - **Protocol fidelity**: the exact lock/CSRF/activation sequencing ADT
//!   requires, not an approximation of it.
//! - **Safety before I/O**: every mutating call passes the [`safety`] gate
//!   before a single byte reaches the network.
//! - **Stable tool surface**: the [`tool_facade`] catalog is fixed; new
//!   object kinds extend [`object_ref::ObjectKind`], they do not grow the
//!   catalog.
//!
//! ## State Management Policy
//!
//! **Runtime-stateful, process-stateless.** The CSRF token, cookie jar and
//! [`metrics::EngineMetrics`] counters live for the lifetime of one
//! [`engine::Engine`] and die with the process. Nothing is written to
//! disk except the deployment archive a caller explicitly supplies.

#![ cfg_attr( doc, doc = include_str!( concat!( env!( "CARGO_MANIFEST_DIR" ), "/", "readme.md" ) ) ) ]

/// Stable error taxonomy shared across every module.
pub mod error;

/// Configuration resolution: CLI/env/dotenv precedence merge into [`config::Config`].
pub mod config;

/// Credential handling: basic auth, inline cookies, Netscape cookie files.
pub mod auth;

/// HTTP transport: URL composition, cookie jar, CSRF lifecycle.
pub mod transport;

/// Safety Gate: operation-class, package-scope, transport-scope and free-SQL checks.
pub mod safety;

/// Object references and the pure ADT URL-derivation function.
pub mod object_ref;

/// Wire codecs: XML templating/parsing, ABAP values envelope, base64, line endings.
pub mod codecs;

/// CDS dependency trees and their traversal helpers.
pub mod dependency_tree;

/// Read-only ADT operations: source/metadata GETs, search, dependency queries, code intelligence.
pub mod read_api;

/// Mutating ADT operations: lock/unlock, source upload, create/delete, check, activate, test.
pub mod crud_api;

/// Multi-step editing workflows built on [`crud_api`] and [`read_api`].
pub mod workflow;

/// Deployment Engine: abapGit-style archive parsing and three-phase deploy.
pub mod deployment;

/// WebSocket multiplexer for streaming exports, RFC calls and debugger events.
#[ cfg( feature = "websocket" ) ]
pub mod websocket;

/// In-process call counters for one engine instance.
pub mod metrics;

/// The top-level [`engine::Engine`]: transport + safety policy + metrics, one gated entry point per workflow.
pub mod engine;

/// The stable tool catalog an LLM-driven agent calls by name.
pub mod tool_facade;

pub use engine::Engine;
pub use error::{ Error, Result };
