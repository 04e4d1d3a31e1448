//! # Repository Sourcing
//!
//! Discovers and ranks open-source repositories that match a taxonomy of
//! topics.
//!
//! Every category of the taxonomy expands into many near-duplicate search
//! queries. The collector runs them in order against a code-hosting search
//! API, deduplicates across queries and across earlier runs, and enriches
//! each new repository with its owner and organization. The scorer then
//! derives features, rescales them, applies signed weights and rolls the
//! scores up to owners and organizations.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │ SearchClient│──▶│  Collector   │──▶│  SQLite  │
//! │  (GitHub)   │   │ norm + dedup │   │ records  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                   ┌───────────────────────┘
//!                   ▼
//!            ┌──────────────┐   ┌──────────┐   ┌──────────────┐
//!            │   Features   │──▶│  Scorer  │──▶│   Rollups    │
//!            └──────────────┘   └──────────┘   │ repo/own/org │
//!                                              └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sourcing init                     # create database
//! sourcing collect                  # run every taxonomy query
//! sourcing collect --category privacy
//! sourcing score --top 20           # rank repositories, owners, orgs
//! sourcing export --level owner --output owners.json
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Raw entities and typed records |
//! | [`normalize`] | Attribute-list projection of raw entities |
//! | [`dedup`] | Known repository ids |
//! | [`collect`] | Taxonomy-driven collection loop |
//! | [`github`] | GitHub search client |
//! | [`features`] | Derived per-repository features |
//! | [`score`] | Min-max rescaling and weighted scoring |
//! | [`rollup`] | Repository, owner and organization rankings |
//! | [`store`] | Persistence trait, SQLite and in-memory stores |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`progress`] | Collection progress on stderr |

pub mod collect;
pub mod config;
pub mod db;
pub mod dedup;
pub mod error;
pub mod export;
pub mod features;
pub mod github;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod progress;
pub mod rollup;
pub mod score;
pub mod score_cmd;
pub mod stats;
pub mod store;
pub mod traits;
