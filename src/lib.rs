//! # Overview
//!
//! `tracegraph` is a trace-processing pipeline runtime: a typed graph of
//! source/filter/sink components connected by ports, driven by a
//! single-threaded cooperative scheduler that pulls batches of messages
//! through pull-based iterators. It ships with a trace intermediate
//! representation (`ir`) modeled on CTF's trace/stream/event/field-class
//! hierarchy, and a packet-oriented, bit-granular CTF binary serializer
//! (`ctfser`).
//!
//! Conceptually a trace is organized as:
//! * Trace (one logical trace)
//!   - One or more streams (timelines)
//!     * A series of events, grouped into packets
//!
//! # Module map
//!
//! - [`value`] — the dynamic `Value` tree used for component parameters and
//!   query results.
//! - [`object`] — the refcount/freeze/object-pool primitives other modules
//!   build on.
//! - [`ir`] — the trace intermediate representation: field classes, fields,
//!   clocks, event/stream/trace classes and their instances, and the
//!   schema validator.
//! - [`message`] — the discriminated message union pulled through the
//!   graph, and its per-graph object pools.
//! - [`graph`] — components, ports, connections, message iterators, the
//!   scheduler, and the query executor. Its `testing` submodule (built
//!   under `cfg(test)` or the `testing` feature) adds a drain-sink harness
//!   for driving a graph from test code.
//! - [`ctfser`] — the CTF packet writer.
//! - [`config`] — TOML-backed component initialization parameter loading.
//! - [`logging`] — process-wide log level and `tracing` bootstrap.
#![deny(warnings, clippy::all)]

pub mod config;
pub mod ctfser;
pub mod error;
pub mod graph;
pub mod ir;
pub mod logging;
pub mod message;
pub mod object;
pub mod prelude;
pub mod types;
pub mod value;
