// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

//! motion-probe: recover motion-design parameters from live web pages.
//!
//! A session drives one page through navigation and scripted interaction
//! while runtime hooks, page probes and a network collector gather evidence;
//! the reconciler folds that evidence into one [`model::SiteRecord`] per
//! site, and batches of records are summarized into frequency reports.

pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod instrument;
pub mod model;
pub mod navigation;
pub mod network;
pub mod progress;
pub mod reconcile;
pub mod renderer;
pub mod report;
pub mod session;
pub mod signatures;
pub mod sites;
