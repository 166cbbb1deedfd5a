pub mod auth;
pub mod client;
pub mod error;
pub mod handoff;
pub mod parse;
pub mod progress;
pub mod session;
pub mod store;
pub mod stream;
pub mod types;

pub use auth::{StoredToken, SyncedTokenGateway, TokenGateway};
pub use client::{AnalyzeResponse, AnalyzeTransport, Backend, HttpTransport};
pub use error::{Result, SessionError};
pub use handoff::{PendingAnalysis, clear_pending, save_pending, take_pending};
pub use parse::parse_analysis;
pub use progress::{Advisory, ProgressEstimator};
pub use session::SessionController;
pub use stream::StreamEvent;
pub use types::{
    AnalysisResult, AnalysisSession, AnalyzeOptions, ProgressEvent, Stage, SummaryLength,
};
