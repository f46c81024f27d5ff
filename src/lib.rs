//! # ragdesk
//!
//! A retrieval-augmented document question-answering service.
//!
//! ragdesk ingests local documents (text, Markdown, PDF, JSON, XLSX), chunks
//! and embeds them into a SQLite-backed vector index, and answers questions
//! grounded in the retrieved content. Two personas are available: a general
//! assistant that answers strictly from context, and "Delia", a specialized
//! assistant for the EDSL scripting language that validates code blocks and
//! adapts to the caller's experience level.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────┐
//! │  Loader  │──▶│   Pipeline   │──▶│  SQLite   │
//! │ txt/pdf/ │   │ Chunk+Embed │   │  vectors  │
//! │ json/xlsx│   └─────────────┘   └────┬─────┘
//! └──────────┘                         │
//!                     ┌────────────────┤
//!                     ▼                ▼
//!                ┌──────────┐    ┌──────────┐
//!                │   CLI    │    │   HTTP   │
//!                │(ragdesk) │    │  (axum)  │
//!                └──────────┘    └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragdesk init                  # create database
//! ragdesk ingest docs/faq.pdf   # load, chunk, embed, index
//! ragdesk ask "What is the refund policy?"
//! ragdesk delia "Revisa este codigo EDSL: ..." --level basic
//! ragdesk serve                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`loader`] | Multi-format document loading |
//! | [`chunker`] | Recursive text chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | LLM provider abstraction |
//! | [`index`] | SQLite-backed vector index |
//! | [`chain`] | Retrieval-augmented generation chains |
//! | [`validator`] | EDSL code-block validation |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chain;
pub mod chunker;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod server;
pub mod state;
pub mod validator;
