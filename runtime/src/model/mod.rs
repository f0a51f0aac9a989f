// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result data model: per-site records and batch aggregates.

pub mod batch;
pub mod record;

pub use batch::{BatchResult, ChannelSummary, SiteFailure, Summary, SummaryChannel};
pub use record::{
    AnimationDetail, CapturedAnimations, CapturedCall, CssFindings, Detection, DialectEasings,
    EasingSet, ElementPatterns, ElementSample, Library, NetworkStats, ScriptDialect, SiteRecord,
    Viewport,
};
