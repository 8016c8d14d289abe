//! # Media Captioner
//!
//! Batch auto-captioning of gallery photos and videos with a remote
//! multimodal model.
//!
//! Each run scans one content directory, converts HEIC photos to JPEG,
//! sends every file with a fixed prompt to the model one at a time, and
//! writes the answers (or the reason a call failed) to a JSON file in the
//! same directory.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Discovery │──▶│ Normalizer │──▶│  Captioning │──▶│ Artifact │
//! │ scan dir  │   │ heic → jpg │   │ one call/item│   │   JSON   │
//! └───────────┘   └─────┬──────┘   └──────┬──────┘   └──────────┘
//!                       └──── events ─────┴──▶ progress / result collector
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! captioner scan                  # what would be captioned
//! captioner images                # caption photos
//! captioner videos                # caption videos
//! captioner compare IMG_5217.JPG  # two models side by side
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Media items, results, MIME table |
//! | [`discovery`] | Content directory scan and duplicate rules |
//! | [`normalize`] | HEIC → JPEG via an external converter |
//! | [`prompt`] | Fixed captioning instructions |
//! | [`backend`] | Inference backend trait and Gemini client |
//! | [`caption`] | Per-item captioning and pacing |
//! | [`progress`] | Pipeline events, reporters, result collector |
//! | [`artifact`] | JSON result writer |
//! | [`pipeline`] | Image, video, and comparison runs |

pub mod artifact;
pub mod backend;
pub mod caption;
pub mod config;
pub mod discovery;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod progress;
pub mod prompt;
