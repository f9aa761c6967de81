//! Rolling memory compaction.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `budget` | Window measurement and fold selection |
//! | `summarizer` | `SummaryProvider` seam, transcript rendering, extractive fallback |
//! | `compactor` | Plans, summarizes and commits compactions in the background |

pub mod budget;
pub mod compactor;
pub mod summarizer;

pub use budget::Budget;
pub use compactor::MemoryCompactor;
pub use summarizer::{ExtractiveSummarizer, SummaryProvider, SummaryRequest, render_transcript};
