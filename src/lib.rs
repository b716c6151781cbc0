//! # Zhora
//!
//! Project memory built from uploaded files. Each upload is described,
//! summarized by a language model, embedded, and stored in SQLite. Questions
//! are answered from the nearest stored documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────┐   ┌────────────┐
//! │  upload  │──▶│ describe→analyze→embed   │──▶│   SQLite   │
//! └──────────┘   └─────────────────────────┘   │ documents  │
//!                                               │ + vectors  │
//! ┌──────────┐   ┌─────────────────────────┐   └─────┬──────┘
//! │ question │──▶│ embed→nearest→analyze    │◀────────┘
//! └──────────┘   └─────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`outcome`] | Typed provider results |
//! | [`settings`] | OpenAI API key storage |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`analyzer`] | Chat-completion content analyzer |
//! | [`providers`] | The adapter pair the pipelines share |
//! | [`extract`] | Content description and text extraction |
//! | [`store`] | Document rows and vector index |
//! | [`ingest`] | Ingestion pipeline |
//! | [`ask`] | Query pipeline |
//! | [`google_auth`] | Google OAuth session |
//! | [`sync`] | Background Gmail / Drive sync loop |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod analyzer;
pub mod ask;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod google_auth;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod outcome;
pub mod providers;
pub mod server;
pub mod settings;
pub mod store;
pub mod sync;
