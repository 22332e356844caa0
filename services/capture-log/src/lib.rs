//! Nier Capture Log Service
//!
//! Ingestion sink for the browser-side detector of the Nier factory floor
//! analytics platform. Clients post raw detection events and base64 image
//! captures; each one is written as its own file on local disk and can be
//! fetched back over plain static routes.
//!
//! ## Features
//!
//! - **Schema-free detection logs**: any well-formed JSON body is wrapped with
//!   an id and timestamp and stored as `<id>.json`
//! - **Data URL captures**: `data:image/<ext>;base64,...` uploads are decoded
//!   and stored as `capture_<id>.<ext>`
//! - **Collision-free naming**: ids are millisecond-scaled but strictly
//!   increasing, and files are published without ever overwriting
//! - **Static retrieval**: `/logs/<file>` and `/captures/<file>`
//!
//! ## Architecture
//!
//! ```text
//! POST /log-detection         POST /upload-capture
//!        │                           │
//!        ▼                           ▼
//! ┌──────────────┐           ┌──────────────┐
//! │ Detection    │           │ Capture      │
//! │ Log Writer   │           │ Writer       │◀── data URL decode
//! └──────────────┘           └──────────────┘
//!        │                           │
//!        ▼                           ▼
//! ┌──────────────┐           ┌──────────────┐
//! │ Artifact     │           │ Artifact     │
//! │ Store        │           │ Store        │
//! └──────────────┘           └──────────────┘
//!        │                           │
//!        ▼                           ▼
//!     logs/ ◀── GET /logs/*      captures/ ◀── GET /captures/*
//! ```

pub mod artifact_store;
pub mod capture;
pub mod config;
pub mod data_url;
pub mod detection_log;
pub mod error;
pub mod provision;
pub mod routes;

pub use artifact_store::{ArtifactNamer, ArtifactStore, RenderedArtifact, StoredArtifact};
pub use capture::{CaptureFile, CaptureWriter};
pub use config::Config;
pub use data_url::ImageDataUrl;
pub use detection_log::{DetectionLogEntry, DetectionLogWriter};
pub use error::IngestError;
pub use provision::OutputDirs;
pub use routes::{create_router, start_api_server, AppState};
